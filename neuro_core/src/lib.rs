pub mod balance;
pub mod clock;
pub mod error;
pub mod messages;
pub mod notify;
pub mod pricing;
pub mod provider;
pub mod training;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;
