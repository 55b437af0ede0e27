//! Infrastructure layer: storage backends and configuration.

pub mod config;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use store::{
    AttendanceStore, CourseStore, InMemoryStore, PostgresStore, ReferenceStore, SessionStore,
    Store, StoreError, StoreResult, UserStore,
};
