pub mod loader;
pub mod types;

pub use loader::{LoaderError, QuoteLoader, EXPECTED_COLUMNS};
pub use types::{Contract, OptionType, Quote, Snapshot};
