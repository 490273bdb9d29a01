pub mod progress;

pub use progress::{GradingUI, drive_events, print_distribution, print_summary};
