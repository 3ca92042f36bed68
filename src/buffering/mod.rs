//! Lock-free SPSC rings for cross-thread audio handoff.
//!
//! One ring sits between the capture callback and the processing thread
//! (`CaptureRing` role: a full ring rejects the excess and the caller counts
//! it as a capture overrun), and one between the processing thread and the
//! render callback (`RenderRing` role: a full ring reclaims the oldest
//! unread samples so a stalled consumer can never block rendering —
//! [`RingProducer::write_overwrite`]).
//!
//! ## Realtime contract
//!
//! `write`, `write_overwrite`, `read` and the `available_*` queries never
//! allocate, never lock and never make a syscall. Index handoff uses
//! acquire/release pairing; no stronger fences are required for the
//! single-producer/single-consumer discipline.
//!
//! Storage is `capacity + 1` slots so a full ring is distinguishable from an
//! empty one, which keeps `available_read() + available_write() == capacity`
//! at all times.

#![allow(unsafe_code)] // UnsafeCell storage shared across the SPSC pair

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

struct RingShared {
    buf: Box<[UnsafeCell<f32>]>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    capacity: usize,
    /// Samples reclaimed from the reader by `write_overwrite`.
    overruns: AtomicU64,
}

// SAFETY: the producer only writes slots in [write_pos, read_pos) (mod len)
// and the consumer only reads slots in [read_pos, write_pos); the atomic
// index handoff orders those accesses. `write_overwrite` reclaims reader
// space by CAS-ing `read_pos` *before* touching the reclaimed slots, so a
// racing `read` retries instead of observing torn data.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

impl RingShared {
    fn slots(&self) -> usize {
        self.buf.len()
    }

    fn readable(&self, w: usize, r: usize) -> usize {
        if w >= r {
            w - r
        } else {
            self.slots() - r + w
        }
    }

    fn writable(&self, w: usize, r: usize) -> usize {
        self.capacity - self.readable(w, r)
    }

    /// Copy `src` into the ring starting at slot `start`, wrapping once.
    fn copy_in(&self, start: usize, src: &[f32]) {
        let first = src.len().min(self.slots() - start);
        for (i, &v) in src[..first].iter().enumerate() {
            unsafe { *self.buf[start + i].get() = v };
        }
        for (i, &v) in src[first..].iter().enumerate() {
            unsafe { *self.buf[i].get() = v };
        }
    }

    /// Copy out of the ring starting at slot `start`, wrapping once.
    fn copy_out(&self, start: usize, dst: &mut [f32]) {
        let first = dst.len().min(self.slots() - start);
        for (i, v) in dst[..first].iter_mut().enumerate() {
            *v = unsafe { *self.buf[start + i].get() };
        }
        let n = dst.len() - first;
        for (i, v) in dst[first..first + n].iter_mut().enumerate() {
            *v = unsafe { *self.buf[i].get() };
        }
    }
}

/// Producer half — held by exactly one thread.
pub struct RingProducer {
    shared: Arc<RingShared>,
}

/// Consumer half — held by exactly one thread.
pub struct RingConsumer {
    shared: Arc<RingShared>,
}

/// Create a matched producer/consumer pair over a ring of `capacity` floats.
///
/// Allocated once here; the ring never reallocates afterwards.
pub fn create_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    let buf = (0..capacity + 1)
        .map(|_| UnsafeCell::new(0.0f32))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(RingShared {
        buf,
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
        capacity,
        overruns: AtomicU64::new(0),
    });
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

impl RingProducer {
    /// Write up to `src.len()` samples without overwriting unread data.
    ///
    /// Returns the count actually written (`< src.len()` when the ring is
    /// near full). The caller accounts the shortfall as an overrun.
    pub fn write(&mut self, src: &[f32]) -> usize {
        let s = &self.shared;
        let w = s.write_pos.load(Ordering::Relaxed);
        let r = s.read_pos.load(Ordering::Acquire);
        let n = src.len().min(s.writable(w, r));
        if n == 0 {
            return 0;
        }
        s.copy_in(w, &src[..n]);
        s.write_pos.store((w + n) % s.slots(), Ordering::Release);
        n
    }

    /// Write all of `src`, reclaiming the oldest unread samples when the
    /// ring is full. Reclaimed samples are counted in [`overrun_count`].
    ///
    /// Writes at most `capacity` samples; when `src` is longer, only its
    /// newest `capacity` samples are kept.
    ///
    /// [`overrun_count`]: RingProducer::overrun_count
    pub fn write_overwrite(&mut self, src: &[f32]) -> usize {
        let s = &self.shared;
        let n = src.len().min(s.capacity);
        let src = &src[src.len() - n..];
        if n == 0 {
            return 0;
        }
        loop {
            let w = s.write_pos.load(Ordering::Relaxed);
            let r = s.read_pos.load(Ordering::Acquire);
            let avail = s.writable(w, r);
            if avail >= n {
                s.copy_in(w, src);
                s.write_pos.store((w + n) % s.slots(), Ordering::Release);
                return n;
            }
            // Reclaim reader space first; a racing read() retries on CAS
            // failure so it never observes the slots we are about to reuse.
            let need = n - avail;
            let new_r = (r + need) % s.slots();
            if s
                .read_pos
                .compare_exchange(r, new_r, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                s.overruns.fetch_add(need as u64, Ordering::Relaxed);
                s.copy_in(w, src);
                s.write_pos.store((w + n) % s.slots(), Ordering::Release);
                return n;
            }
            // Consumer advanced concurrently; recompute with fresh indices.
        }
    }

    /// Free space in samples. Consistent snapshot; the true value can only
    /// grow between this call and a subsequent `write`.
    pub fn available_write(&self) -> usize {
        let s = &self.shared;
        let w = s.write_pos.load(Ordering::Acquire);
        let r = s.read_pos.load(Ordering::Acquire);
        s.writable(w, r)
    }

    /// Unread samples currently queued.
    pub fn available_read(&self) -> usize {
        self.shared.capacity - self.available_write()
    }

    /// Total samples reclaimed by `write_overwrite` since creation.
    pub fn overrun_count(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

impl RingConsumer {
    /// Read up to `dst.len()` samples. Returns the count actually read.
    pub fn read(&mut self, dst: &mut [f32]) -> usize {
        let s = &self.shared;
        loop {
            let r = s.read_pos.load(Ordering::Acquire);
            let w = s.write_pos.load(Ordering::Acquire);
            let n = dst.len().min(s.readable(w, r));
            if n == 0 {
                return 0;
            }
            s.copy_out(r, &mut dst[..n]);
            if s
                .read_pos
                .compare_exchange(r, (r + n) % s.slots(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return n;
            }
            // An overwrite reclaimed part of this region mid-copy; the data
            // in dst may be torn, so redo the copy from the fresh indices.
        }
    }

    /// Unread samples currently queued.
    pub fn available_read(&self) -> usize {
        let s = &self.shared;
        let w = s.write_pos.load(Ordering::Acquire);
        let r = s.read_pos.load(Ordering::Acquire);
        s.readable(w, r)
    }

    /// Free space in samples.
    pub fn available_write(&self) -> usize {
        self.shared.capacity - self.available_read()
    }

    /// Total samples reclaimed by overwrite on the producer side.
    pub fn overrun_count(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Drop all queued samples and zero the storage.
    ///
    /// Only valid while the producer is quiescent (pipeline stopped).
    pub fn clear(&mut self) {
        let s = &self.shared;
        for cell in s.buf.iter() {
            unsafe { *cell.get() = 0.0 };
        }
        s.read_pos.store(0, Ordering::Release);
        s.write_pos.store(0, Ordering::Release);
    }
}
