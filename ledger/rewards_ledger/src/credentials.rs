//! Password hashing seam. The concrete scheme lives with the service.
//!
//! Hashing is slow, so both operations are futures and an
//! implementation may move the work off the async worker.

use std::future::Future;

use crate::errors::Result;

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> impl Future<Output = Result<String>> + Send;

    fn verify(&self, password: &str, hash: &str) -> impl Future<Output = Result<bool>> + Send;
}
