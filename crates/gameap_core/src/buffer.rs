use parking_lot::Mutex;

/// Sink for command output shared between a running command and its readers.
pub trait OutputWriter: Send + Sync {
    fn write(&self, bytes: &[u8]);

    fn write_str(&self, s: &str) {
        self.write(s.as_bytes());
    }

    fn write_line(&self, s: &str) {
        self.write(s.as_bytes());
        self.write(b"\n");
    }
}

/// Byte buffer safe to share across tasks.
///
/// [`SafeBuffer::read_output`] drains what was written so far, so repeated
/// readers each see only the new part.
#[derive(Debug, Default)]
pub struct SafeBuffer {
    inner: Mutex<Vec<u8>>,
}

impl SafeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Unread content, left in place.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl OutputWriter for SafeBuffer {
    fn write(&self, bytes: &[u8]) {
        self.inner.lock().extend_from_slice(bytes);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl OutputWriter for NullOutput {
    fn write(&self, _bytes: &[u8]) {}
}
