pub mod scanner;

pub use scanner::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, ScannerConfig, ScannerConfigSource,
};
