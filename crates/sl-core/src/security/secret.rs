use std::fmt;
use std::ops::Deref;
use zeroize::Zeroize;

/// A sensitive string (operator PIN) that must never be logged, cloned, or serialized.
///
/// 敏感字符串：
/// - 不可 Clone
/// - 不可 Serialize / Deserialize
/// - 不可 Debug / Display 输出真实内容
/// - Drop 时清零内存
pub struct SecretString {
    inner: String,
}

impl SecretString {
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Borrow the inner secret as &str.
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Deref for SecretString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.expose()
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Secret byte buffer (wallet secret, reconstructed secret, shard payload).
///
/// Zeroed on drop; debug output never shows the content.
pub struct SecretBytes {
    inner: Vec<u8>,
}

impl SecretBytes {
    pub fn new(value: Vec<u8>) -> Self {
        Self { inner: value }
    }

    pub fn expose(&self) -> &[u8] {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Zero the buffer now instead of waiting for drop.
    pub fn wipe(&mut self) {
        self.inner.zeroize();
        self.inner.clear();
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([REDACTED; {}])", self.inner.len())
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let pin = SecretString::new("1234".to_string());
        assert_eq!(format!("{pin:?}"), "[REDACTED]");
        assert_eq!(format!("{pin}"), "[REDACTED]");
        assert_eq!(pin.expose(), "1234");

        let bytes = SecretBytes::new(vec![1, 2, 3]);
        assert_eq!(format!("{bytes:?}"), "SecretBytes([REDACTED; 3])");
    }

    #[test]
    fn wipe_clears_buffer() {
        let mut bytes = SecretBytes::new(vec![9; 8]);
        bytes.wipe();
        assert!(bytes.is_empty());
    }
}
