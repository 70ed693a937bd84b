use std::cell::RefCell;
use std::io;

use bitflags::bitflags;

use crate::runtime::error::{Result, ScmError};
use crate::runtime::heap::{Cell, Heap};

use super::Value;

bitflags! {
    /// Direction capabilities of a port.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PortFlags: u8 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
    }
}

/// Live backing of an open port; a closed port has none.
pub(crate) enum PortImpl {
    Str(String),
    Writer {
        label: String,
        out: Box<dyn io::Write>,
    },
}

/// A character sink (or source handle) living on the heap.
///
/// The backing sits behind a `RefCell` so that emission, which only ever
/// holds a shared borrow of the heap, can still append text.
pub struct Port {
    flags: PortFlags,
    impl_: RefCell<Option<PortImpl>>,
}

impl Port {
    pub(crate) fn new(flags: PortFlags, backing: PortImpl) -> Self {
        Self {
            flags,
            impl_: RefCell::new(Some(backing)),
        }
    }

    pub fn flags(&self) -> PortFlags {
        self.flags
    }

    pub fn is_live(&self) -> bool {
        self.impl_.borrow().is_some()
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(PortFlags::OUTPUT)
    }

    pub fn put_str(&self, s: &str) -> Result<()> {
        match self.impl_.borrow_mut().as_mut() {
            Some(PortImpl::Str(buf)) => {
                buf.push_str(s);
                Ok(())
            }
            Some(PortImpl::Writer { out, .. }) => Ok(out.write_all(s.as_bytes())?),
            None => Err(ScmError::PortClosed),
        }
    }

    pub fn put_char(&self, c: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.put_str(c.encode_utf8(&mut buf))
    }

    pub fn flush(&self) -> Result<()> {
        match self.impl_.borrow_mut().as_mut() {
            Some(PortImpl::Str(_)) => Ok(()),
            Some(PortImpl::Writer { out, .. }) => Ok(out.flush()?),
            None => Err(ScmError::PortClosed),
        }
    }

    /// Short description of the backing for `#<...port ...>` output; empty
    /// once the port is closed.
    pub fn inspect(&self) -> String {
        match self.impl_.borrow().as_ref() {
            Some(PortImpl::Str(_)) => "string".to_owned(),
            Some(PortImpl::Writer { label, .. }) => label.clone(),
            None => String::new(),
        }
    }

    pub fn close(&self) -> Result<()> {
        if let Some(PortImpl::Writer { out, .. }) = self.impl_.borrow_mut().as_mut() {
            out.flush()?;
        }
        *self.impl_.borrow_mut() = None;
        Ok(())
    }
}

impl Heap {
    /// Opens an output port that accumulates into an in-memory string.
    pub fn open_output_string(&mut self) -> Value {
        self.alloc_value(Cell::Port(Port::new(
            PortFlags::OUTPUT,
            PortImpl::Str(String::new()),
        )))
    }

    /// Opens an input port over fixed contents. Reading is the concern of
    /// the (separate) reader; the handle exists so such ports can be held
    /// and printed.
    pub fn open_input_string(&mut self, contents: &str) -> Value {
        self.alloc_value(Cell::Port(Port::new(
            PortFlags::INPUT,
            PortImpl::Str(contents.to_owned()),
        )))
    }

    /// Wraps an arbitrary byte sink; `label` is what `inspect` reports
    /// (conventionally `"file NAME"`).
    pub fn open_output_writer(&mut self, label: impl Into<String>, out: Box<dyn io::Write>) -> Value {
        self.alloc_value(Cell::Port(Port::new(
            PortFlags::OUTPUT,
            PortImpl::Writer {
                label: label.into(),
                out,
            },
        )))
    }

    pub fn is_port(&self, v: Value) -> bool {
        self.port(v).is_some()
    }

    pub fn port(&self, v: Value) -> Option<&Port> {
        match v {
            Value::Obj(r) => match self.cell(r) {
                Cell::Port(p) => Some(p),
                _ => None,
            },
            _ => None,
        }
    }

    /// Accumulated text of an open string output port.
    pub fn get_output_string(&self, port: Value) -> Result<String> {
        let p = self.port(port).ok_or(ScmError::ExpectedPort)?;
        match p.impl_.borrow().as_ref() {
            Some(PortImpl::Str(buf)) => Ok(buf.clone()),
            Some(PortImpl::Writer { .. }) => Err(ScmError::ExpectedStringPort),
            None => Err(ScmError::PortClosed),
        }
    }

    pub fn close_port(&self, port: Value) -> Result<()> {
        self.port(port).ok_or(ScmError::ExpectedPort)?.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_port_accumulates() {
        let mut heap = Heap::new();
        let port = heap.open_output_string();
        let p = heap.port(port).unwrap();
        p.put_str("ab").unwrap();
        p.put_char('c').unwrap();
        assert_eq!(heap.get_output_string(port).unwrap(), "abc");
        assert_eq!(p.inspect(), "string");
    }

    #[test]
    fn closed_port_rejects_output() {
        let mut heap = Heap::new();
        let port = heap.open_output_string();
        heap.close_port(port).unwrap();
        let p = heap.port(port).unwrap();
        assert!(!p.is_live());
        assert!(matches!(p.put_str("x"), Err(ScmError::PortClosed)));
        assert_eq!(p.inspect(), "");
    }

    #[test]
    fn writer_port_reaches_the_sink() {
        use std::rc::Rc;

        #[derive(Clone, Default)]
        struct SharedBuf(Rc<RefCell<Vec<u8>>>);

        impl io::Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut heap = Heap::new();
        let buf = SharedBuf::default();
        let port = heap.open_output_writer("file out.scm", Box::new(buf.clone()));
        let p = heap.port(port).unwrap();
        p.put_str("42").unwrap();
        p.flush().unwrap();
        assert_eq!(&*buf.0.borrow(), b"42");
        assert_eq!(p.inspect(), "file out.scm");
        assert!(matches!(
            heap.get_output_string(port),
            Err(ScmError::ExpectedStringPort)
        ));
    }

    #[test]
    fn non_ports_are_rejected() {
        let heap = Heap::new();
        assert!(!heap.is_port(Value::Int(1)));
        assert!(matches!(
            heap.get_output_string(Value::Int(1)),
            Err(ScmError::ExpectedPort)
        ));
    }
}
