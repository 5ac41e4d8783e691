//! Built-in provider adapters.

pub mod aws;
pub mod oracle;

pub use aws::AwsAdapter;
pub use oracle::OracleAdapter;
