/// Database Module
///
/// The query engine, split by concern:
/// - **Parameter rewriting** (`rewrite.rs`): expands list parameters into placeholder runs
/// - **Binding** (`binder.rs`): prepares statements and binds parameter mappings
/// - **Dispatch** (`dispatch.rs`): decides what a statement returns from its leading keyword
/// - **Recovery** (`recovery.rs`): connection state and the reconnect-and-retry decision
/// - **Cursors** (`cursor.rs`): lazy, single-pass row iteration
/// - **Writes** (`writes.rs`): SQL builders for insert, multi-row insert and update
/// - **Engine** (`engine.rs`): the `Database` surface tying the above together
pub mod binder;
pub mod cursor;
pub mod dispatch;
pub mod engine;
pub mod recovery;
pub mod rewrite;
pub mod writes;

pub use cursor::RowCursor;
pub use dispatch::StatementKind;
pub use engine::{CursorOutcome, Database, DatabaseBuilder, QueryOutcome, QueryStats, StatementOf};
pub use recovery::{ConnectionState, Decision, RecoveryPolicy, RETRY_ATTEMPTS};
pub use rewrite::rewrite;
