//! Transport implementations.
//!
//! [`memory`] keeps queues and topics in process and is always available.
//! [`aws`] talks to SQS and SNS and is enabled with the `aws` feature.

#[cfg(feature = "aws")]
pub mod aws;
pub mod memory;
