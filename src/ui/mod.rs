pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{banner, human_bytes, info, muted, resource_icon, status, success, warn};
pub use progress::Spinner;
pub use table::{ListingRow, TableBuilder, listing_table, stats_table};
pub use theme::{theme, Theme};
