pub mod batching;
pub mod clock;
pub mod error;
pub mod executable_utils;
pub mod mailer;
pub mod model;
pub mod otp;
pub mod pricing;
pub mod rate_limiter;
pub mod scorers;
pub mod service;
pub mod storage;
