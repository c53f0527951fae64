

#[cfg(test)]
pub mod expiry_tests;
