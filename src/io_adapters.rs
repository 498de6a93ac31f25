use std::cell::RefCell;
use std::io::{Result as IoResult, Write};
use std::rc::Rc;

/// Read side of a [`MemWriter`]: everything written so far.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl Captured {
    /// Collected output as text (invalid UTF-8 is replaced).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    /// Like [`Captured::text`], also clearing the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buf.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Memory-backed writer for capturing interpreter output.
#[derive(Debug, Default)]
pub struct MemWriter {
    buf: Captured,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: create writer and return (writer, handle).
    pub fn with_handle() -> (Self, Captured) {
        let mw = MemWriter::new();
        let handle = mw.buf.clone();
        (mw, handle)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
