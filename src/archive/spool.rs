//! Seekable write buffer that forwards finished bytes to a channel.
//!
//! The zip writer seeks back to patch the local header of the entry it is
//! writing, so bytes can only leave once the next entry has started. The
//! spool keeps everything from `base` onwards in memory and releases the
//! prefix on request.

use std::cell::RefCell;
use std::io::{self, Seek, SeekFrom, Write};
use std::rc::Rc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Largest chunk handed to the channel at once.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Item type of the export channel.
pub type Chunk = io::Result<Bytes>;

struct State {
    /// Absolute offset of `buf[0]`.
    base: u64,
    buf: Vec<u8>,
    /// Absolute cursor position.
    pos: u64,
    sink: mpsc::Sender<Chunk>,
}

impl State {
    fn end(&self) -> u64 {
        self.base + self.buf.len() as u64
    }
}

/// Handle to a shared spool. Clones refer to the same buffer.
#[derive(Clone)]
pub struct Spool {
    state: Rc<RefCell<State>>,
}

impl Spool {
    pub fn new(sink: mpsc::Sender<Chunk>) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                base: 0,
                buf: Vec::new(),
                pos: 0,
                sink,
            })),
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.state.borrow().pos
    }

    /// Send every byte before `offset` to the channel.
    ///
    /// Blocks while the channel is full. Fails with `BrokenPipe` once the
    /// receiving side is gone.
    pub fn release_before(&self, offset: u64) -> io::Result<()> {
        let (released, sink) = {
            let mut state = self.state.borrow_mut();
            let offset = offset.min(state.end());
            if offset <= state.base {
                return Ok(());
            }

            let n = (offset - state.base) as usize;
            let rest = state.buf.split_off(n);
            let released = std::mem::replace(&mut state.buf, rest);
            state.base = offset;
            (Bytes::from(released), state.sink.clone())
        };

        let mut start = 0;
        while start < released.len() {
            let end = (start + CHUNK_SIZE).min(released.len());
            sink.blocking_send(Ok(released.slice(start..end)))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "export stream closed"))?;
            start = end;
        }

        Ok(())
    }

    /// Send everything still buffered.
    pub fn release_all(&self) -> io::Result<()> {
        let end = self.state.borrow().end();
        self.release_before(end)
    }
}

impl Write for Spool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let start = (state.pos - state.base) as usize;
        let end = start + data.len();
        if end > state.buf.len() {
            state.buf.resize(end, 0);
        }
        state.buf[start..end].copy_from_slice(data);
        state.pos += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Spool {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut state = self.state.borrow_mut();
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => state.end().checked_add_signed(delta),
        };

        match target {
            Some(target) if target >= state.base => {
                state.pos = target;
                Ok(target)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek into released region",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<Chunk>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn test_write_and_patch() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut spool = Spool::new(tx);

        spool.write_all(b"hello world").unwrap();
        spool.seek(SeekFrom::Start(0)).unwrap();
        spool.write_all(b"J").unwrap();
        spool.seek(SeekFrom::End(0)).unwrap();
        spool.write_all(b"!").unwrap();

        spool.release_all().unwrap();
        assert_eq!(drain(&mut rx), b"Jello world!");
        assert_eq!(spool.state.borrow().buf.len(), 0);
    }

    #[test]
    fn test_release_prefix() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut spool = Spool::new(tx);

        spool.write_all(b"abcdef").unwrap();
        spool.release_before(4).unwrap();
        assert_eq!(drain(&mut rx), b"abcd");
        assert_eq!(spool.state.borrow().buf.len(), 2);
        assert_eq!(spool.position(), 6);

        // The kept suffix is still patchable.
        spool.seek(SeekFrom::Start(4)).unwrap();
        spool.write_all(b"E").unwrap();
        spool.release_all().unwrap();
        assert_eq!(drain(&mut rx), b"Ef");
    }

    #[test]
    fn test_seek_into_released_region_fails() {
        let (tx, _rx) = mpsc::channel(16);
        let mut spool = Spool::new(tx);

        spool.write_all(b"abcdef").unwrap();
        spool.release_before(3).unwrap();

        assert!(spool.seek(SeekFrom::Start(2)).is_err());
        assert!(spool.seek(SeekFrom::Current(-4)).is_err());
        assert_eq!(spool.seek(SeekFrom::Current(-3)).unwrap(), 3);
    }

    #[test]
    fn test_large_release_is_chunked() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut spool = Spool::new(tx);

        spool.write_all(&vec![7u8; CHUNK_SIZE * 2 + 10]).unwrap();
        spool.release_all().unwrap();

        let sizes: Vec<usize> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|chunk| chunk.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 10]);
    }

    #[test]
    fn test_closed_receiver_is_broken_pipe() {
        let (tx, rx) = mpsc::channel(16);
        let mut spool = Spool::new(tx);
        drop(rx);

        spool.write_all(b"data").unwrap();
        let err = spool.release_all().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
