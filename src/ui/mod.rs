pub mod output;
pub mod table;
pub mod theme;

pub use output::{error, header, info, success, warn};
pub use table::{metrics_table, stats_table};
pub use theme::{theme, Role, Stream, Theme};
