//! Fixed-capacity circular byte buffer with independent reader cursors.
//!
//! # What is a circular buffer? (for beginners)
//!
//! A circular (or *ring*) buffer is a fixed-size array whose end is treated as
//! if it were glued to its beginning.  A *write cursor* marks where the next
//! byte goes; when it reaches the end of the array it wraps back to index 0.
//!
//! ```text
//!  capacity = 8
//!  ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!  │ g │ h │ c │ d │ e │ f │   │   │     write cursor = 2 (after "gh" wrapped)
//!  └───┴───┴───┴───┴───┴───┴───┴───┘
//!            ▲ reader A at 2: nothing new
//!    ▲ reader B at 0: "gh" available
//! ```
//!
//! Readers do not consume bytes.  Each reader owns a [`ReadCursor`] and the
//! buffer only ever tells it how far behind the writer it is.  This is how one
//! serial port can be observed by several clients at once, each making its own
//! progress.
//!
//! # Overflow policy
//!
//! The writer never waits for slow readers.  If a reader falls more than one
//! full lap behind, the bytes it has not read yet are silently overwritten.
//! A reader whose cursor lands exactly on the write cursor sees zero bytes,
//! whether the buffer is empty or the reader is precisely one lap behind.  The
//! two cases cannot be told apart from the cursor positions alone.
//!
//! # Locking
//!
//! Every operation takes the buffer's single [`Mutex`] for its whole duration.
//! Calling [`CircularSerialBuffer::available`] and then
//! [`CircularSerialBuffer::read`] is two separate acquisitions: another writer
//! may slip in between, so the read is clamped again under its own lock.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Capacity used for both buffers of a port unless the caller picks one.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// A reader's position inside a [`CircularSerialBuffer`].
///
/// Cursors are plain values owned by whoever reads the buffer.  They are only
/// ever produced by the buffer itself ([`CircularSerialBuffer::write_cursor`]
/// and [`CircularSerialBuffer::read`]) so their position is always inside the
/// buffer's capacity.  The default cursor sits at offset 0, which is where a
/// freshly created buffer starts writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadCursor(usize);

impl ReadCursor {
    /// Offset of this cursor inside the backing storage.
    pub fn position(self) -> usize {
        self.0
    }
}

/// Mutable state guarded by the buffer lock.
struct RingState {
    storage: Box<[u8]>,
    write_pos: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes between `pos` and the write cursor, going forward.
    fn available_from(&self, pos: usize) -> usize {
        if self.write_pos >= pos {
            self.write_pos - pos
        } else {
            self.capacity() - pos + self.write_pos
        }
    }
}

/// A lock-guarded ring buffer with one write cursor and any number of readers.
///
/// # Examples
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use pigpio_core::CircularSerialBuffer;
///
/// let buffer = CircularSerialBuffer::new(NonZeroUsize::new(16).unwrap());
/// let cursor = buffer.write_cursor();
///
/// buffer.write(b"hello");
/// assert_eq!(buffer.available(cursor), 5);
///
/// let (bytes, cursor) = buffer.read(cursor, 64);
/// assert_eq!(bytes, b"hello");
/// assert_eq!(buffer.available(cursor), 0);
/// ```
pub struct CircularSerialBuffer {
    state: Mutex<RingState>,
}

impl CircularSerialBuffer {
    /// Creates a zero-filled buffer holding `capacity` bytes.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(RingState {
                storage: vec![0u8; capacity.get()].into_boxed_slice(),
                write_pos: 0,
            }),
        }
    }

    /// Creates a buffer with [`DEFAULT_BUFFER_CAPACITY`] bytes.
    pub fn with_default_capacity() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_BUFFER_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    /// Number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Returns a cursor positioned at the current write cursor.
    ///
    /// A reader starting here sees only bytes written from now on.
    pub fn write_cursor(&self) -> ReadCursor {
        ReadCursor(self.lock().write_pos)
    }

    /// Appends `bytes` at the write cursor, wrapping around the end.
    ///
    /// Never blocks on readers and never fails.  When `bytes` is longer than
    /// the capacity only its last `capacity` bytes remain stored, but the
    /// write cursor still advances by the full length (modulo capacity).
    pub fn write(&self, bytes: &[u8]) {
        let mut state = self.lock();
        let cap = state.capacity();

        // Whole laps that would be overwritten within this same call.
        let skip = bytes.len().saturating_sub(cap);
        let mut pos = (state.write_pos + skip) % cap;
        let mut remaining = &bytes[skip..];

        while !remaining.is_empty() {
            let chunk = remaining.len().min(cap - pos);
            state.storage[pos..pos + chunk].copy_from_slice(&remaining[..chunk]);
            pos = (pos + chunk) % cap;
            remaining = &remaining[chunk..];
        }

        state.write_pos = pos;
    }

    /// Reads up to `max_len` bytes starting at `cursor`.
    ///
    /// The length is clamped to [`available`](Self::available) under the same
    /// lock, so the returned bytes are always ones the writer has produced
    /// since the cursor's position.  Returns the bytes and the advanced cursor.
    pub fn read(&self, cursor: ReadCursor, max_len: usize) -> (Vec<u8>, ReadCursor) {
        let state = self.lock();
        let cap = state.capacity();
        let start = cursor.0 % cap;
        let len = max_len.min(state.available_from(start));

        let mut out = Vec::with_capacity(len);
        let first = len.min(cap - start);
        out.extend_from_slice(&state.storage[start..start + first]);
        out.extend_from_slice(&state.storage[..len - first]);

        (out, ReadCursor((start + len) % cap))
    }

    /// Bytes available to a reader at `cursor`.
    ///
    /// `(write_cursor - cursor) mod capacity`; a cursor equal to the write
    /// cursor always reports zero.
    pub fn available(&self, cursor: ReadCursor) -> usize {
        let state = self.lock();
        let start = cursor.0 % state.capacity();
        state.available_from(start)
    }

    /// Acquires the buffer lock.
    ///
    /// The state is consistent between operations (each one finishes its
    /// mutation before releasing), so a poisoned lock is simply recovered.
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircularSerialBuffer {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl fmt::Debug for CircularSerialBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CircularSerialBuffer")
            .field("capacity", &state.capacity())
            .field("write_pos", &state.write_pos)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
