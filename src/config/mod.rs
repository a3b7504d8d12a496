//! Configuration management for Hark.

mod settings;

pub use settings::{
    ApiSettings, AudioSettings, GeneralSettings, RetrySettings, Settings, SummarizeSettings,
};
