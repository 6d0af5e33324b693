use sqlrun::config::{default_config_path, load_config};
use sqlrun::{Database, Param, Params, QueryOutcome, SqliteDriver, Value};
use std::path::PathBuf;
use std::process;
use tracing::info;

const USAGE: &str = "Usage: sqlrun [--config <file>] <sql> [param ...]

Params are positional, or `:name=value` for named placeholders.
Named list params are written `:name=[a,b,c]`.";

fn main() {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, sql, params) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{}\n\n{}", msg, USAGE);
            process::exit(2);
        }
    };

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path.display(), e);
            process::exit(2);
        }
    };

    let mut db = match Database::from_config(SqliteDriver, &config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    info!("Running against {}", db.options().dsn);

    match db.query(&sql, &params) {
        Ok(QueryOutcome::Rows(rows)) => {
            for row in rows {
                match serde_json::to_string(&row) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("Could not encode row: {}", e),
                }
            }
        }
        Ok(QueryOutcome::Affected(n)) => println!("{} row(s) affected", n),
        Ok(QueryOutcome::Empty) => println!("OK"),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Result<(PathBuf, String, Params), String> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = iter.next().ok_or("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Err("sqlrun runs one statement".to_string()),
            _ => rest.push(arg.as_str()),
        }
    }

    let config = match config.or_else(default_config_path) {
        Some(path) => path,
        None => return Err("no --config given and no config directory found".to_string()),
    };
    let (sql, values) = rest.split_first().ok_or("missing SQL statement")?;
    Ok((config, sql.to_string(), parse_params(values)?))
}

fn parse_params(values: &[&str]) -> Result<Params, String> {
    let named = values.iter().filter(|v| v.starts_with(':')).count();
    if named == 0 {
        return Ok(Params::positional(values.iter().map(|v| parse_value(v))));
    }
    if named != values.len() {
        return Err("cannot mix named and positional params".to_string());
    }
    let mut entries = Vec::with_capacity(values.len());
    for value in values {
        let (name, raw) = value
            .split_once('=')
            .ok_or_else(|| format!("named param {value} needs a value"))?;
        let param = match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            Some(list) => Param::list(list.split(',').filter(|s| !s.is_empty()).map(parse_value)),
            None => Param::Scalar(parse_value(raw)),
        };
        entries.push((name.to_string(), param));
    }
    Ok(Params::named(entries))
}

fn parse_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Text(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_positional() {
        let (config, sql, params) =
            parse_args(&args(&["--config", "db.toml", "SELECT ?, ?", "1", "x"])).unwrap();
        assert_eq!(config, PathBuf::from("db.toml"));
        assert_eq!(sql, "SELECT ?, ?");
        assert_eq!(params, Params::positional([Value::Integer(1), Value::from("x")]));
    }

    #[test]
    fn test_parse_named_list() {
        let params = parse_params(&[":ids=[1,2]", ":name=bob"]).unwrap();
        assert_eq!(params.get("ids"), Some(&Param::list([1, 2])));
        assert_eq!(params.get("name"), Some(&Param::from("bob")));
        assert!(parse_params(&[":a=1", "2"]).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("NULL"), Value::Null);
        assert_eq!(parse_value("1.5"), Value::Real(1.5));
        assert_eq!(parse_value("abc"), Value::from("abc"));
    }
}
