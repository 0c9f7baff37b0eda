#![forbid(unsafe_code)]

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::rngs::OsRng;
use rand::Rng;
use smarthome_contracts::otp::{OtpCode, OtpLength};
use tracing::debug;

/// Holds the single current one-time code. Readers get an owned snapshot, and
/// a refresh replaces the whole value under the write lock, so a reader never
/// sees a partially updated code.
#[derive(Debug)]
pub struct OtpGenerator {
    length: OtpLength,
    current: RwLock<OtpCode>,
}

impl OtpGenerator {
    pub fn new(length: OtpLength) -> Self {
        Self {
            length,
            current: RwLock::new(generate_code(length)),
        }
    }

    pub fn length(&self) -> OtpLength {
        self.length
    }

    pub fn current(&self) -> OtpCode {
        self.read().clone()
    }

    pub fn refresh(&self) -> OtpCode {
        let next = generate_code(self.length);
        *self.write() = next.clone();
        debug!(len = self.length.get(), "otp refreshed");
        next
    }

    // The guarded value is always a complete code, so a poisoned lock is safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, OtpCode> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, OtpCode> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn generate_code(length: OtpLength) -> OtpCode {
    let mut rng = OsRng;
    OtpCode::from_digit_fn(length, || rng.gen_range(0..10u8))
}
