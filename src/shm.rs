//! Shared memory pool
//!
//! Keeps a bounded FIFO of idle SysV segments that are already attached to
//! the X server, so producers can reuse them for `ShmGetImage` transfers
//! instead of creating and attaching a new segment every frame.

use std::collections::VecDeque;
use std::io;
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use crate::display::DisplayServer;
use crate::error::{Error, Result};

/// Default number of idle segments kept for reuse
pub const MAX_IDLE_SEGMENTS: usize = 10;

/// OS-level shared memory backing a segment; releasing it happens on drop
pub trait ShmMemory: Send {
    /// Id passed to `ShmAttach`
    fn shmid(&self) -> u32;

    fn size(&self) -> usize;
}

/// Creates the OS-level memory for new segments
pub trait ShmAllocator: Send {
    type Memory: ShmMemory;

    fn allocate(&self, size: usize) -> Result<Self::Memory>;
}

/// A segment attached to the X server
#[derive(Debug)]
pub struct ShmSegment<M> {
    xid: u32,
    memory: M,
}

impl<M: ShmMemory> ShmSegment<M> {
    /// `Seg` id known to the X server
    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn size(&self) -> usize {
        self.memory.size()
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }
}

/// Bounded free-list of idle segments, evicted oldest-first
pub struct ShmPool<A: ShmAllocator> {
    allocator: A,
    idle: VecDeque<ShmSegment<A::Memory>>,
    capacity: usize,
}

impl<A: ShmAllocator> ShmPool<A> {
    pub fn new(allocator: A, capacity: usize) -> Self {
        Self {
            allocator,
            idle: VecDeque::new(),
            capacity,
        }
    }

    /// Check out the first idle segment holding at least `min_size` bytes,
    /// or create and attach a new one of exactly `min_size` bytes
    pub fn acquire<D>(&mut self, conn: &D, min_size: usize) -> Result<ShmSegment<A::Memory>>
    where
        D: DisplayServer + ?Sized,
    {
        if let Some(index) = self.idle.iter().position(|seg| seg.size() >= min_size) {
            if let Some(segment) = self.idle.remove(index) {
                return Ok(segment);
            }
        }

        let memory = self.allocator.allocate(min_size)?;
        let xid = conn.generate_id()?;
        conn.shm_attach(xid, memory.shmid())?;
        debug!(
            "Attached shm segment {:#x} (shmid {}, {} bytes)",
            xid,
            memory.shmid(),
            min_size
        );

        Ok(ShmSegment { xid, memory })
    }

    /// Return a segment to the pool, evicting the oldest idle ones past capacity
    pub fn release<D>(&mut self, conn: &D, segment: ShmSegment<A::Memory>) -> Result<()>
    where
        D: DisplayServer + ?Sized,
    {
        self.idle.push_back(segment);
        self.collect(conn)
    }

    fn collect<D>(&mut self, conn: &D) -> Result<()>
    where
        D: DisplayServer + ?Sized,
    {
        while self.idle.len() > self.capacity {
            if let Some(segment) = self.idle.pop_front() {
                Self::destroy(conn, segment)?;
            }
        }
        Ok(())
    }

    /// Detach and free every idle segment
    pub fn drain<D>(&mut self, conn: &D) -> Result<()>
    where
        D: DisplayServer + ?Sized,
    {
        let mut first_error = None;
        while let Some(segment) = self.idle.pop_front() {
            if let Err(e) = Self::destroy(conn, segment) {
                warn!("Failed to detach shm segment: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn destroy<D>(conn: &D, segment: ShmSegment<A::Memory>) -> Result<()>
    where
        D: DisplayServer + ?Sized,
    {
        let ShmSegment { xid, memory } = segment;
        debug!("Evicting shm segment {:#x} ({} bytes)", xid, memory.size());
        // Memory is released even if the server side detach fails
        let detached = conn.shm_detach(xid);
        drop(memory);
        detached
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Allocates private SysV segments with `IPC_CREAT | IPC_EXCL`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysvAllocator;

impl ShmAllocator for SysvAllocator {
    type Memory = SysvSegment;

    fn allocate(&self, size: usize) -> Result<SysvSegment> {
        SysvSegment::create(size)
    }
}

/// A private SysV shared memory segment mapped into this process
#[derive(Debug)]
pub struct SysvSegment {
    shmid: libc::c_int,
    size: usize,
    addr: NonNull<u8>,
}

// The mapping is owned exclusively by this value
unsafe impl Send for SysvSegment {}

impl SysvSegment {
    pub fn create(size: usize) -> Result<Self> {
        let os_error = |source: io::Error| Error::SharedMemory { size, source };

        let shmid = unsafe {
            libc::shmget(
                libc::IPC_PRIVATE,
                size,
                libc::IPC_CREAT | libc::IPC_EXCL | 0o600,
            )
        };
        if shmid < 0 {
            return Err(os_error(io::Error::last_os_error()));
        }

        let addr = unsafe { libc::shmat(shmid, ptr::null(), 0) };
        if addr as isize == -1 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut());
            }
            return Err(os_error(err));
        }

        let Some(addr) = NonNull::new(addr.cast::<u8>()) else {
            unsafe {
                libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut());
            }
            return Err(os_error(io::Error::other("shmat returned a null mapping")));
        };

        Ok(Self { shmid, size, addr })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.addr.as_ptr(), self.size) }
    }
}

impl ShmMemory for SysvSegment {
    fn shmid(&self) -> u32 {
        self.shmid as u32
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl Drop for SysvSegment {
    fn drop(&mut self) {
        unsafe {
            if libc::shmdt(self.addr.as_ptr() as *const libc::c_void) != 0 {
                warn!("shmdt({}) failed: {}", self.shmid, io::Error::last_os_error());
            }
            if libc::shmctl(self.shmid, libc::IPC_RMID, ptr::null_mut()) != 0 {
                warn!("shmctl(IPC_RMID, {}) failed: {}", self.shmid, io::Error::last_os_error());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::display::testing::FakeDisplay;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records which fake segments have been freed
    #[derive(Default, Clone)]
    pub(crate) struct FakeAllocator {
        next: Arc<Mutex<u32>>,
        pub(crate) freed: Arc<Mutex<Vec<u32>>>,
    }

    pub(crate) struct FakeMemory {
        shmid: u32,
        size: usize,
        freed: Arc<Mutex<Vec<u32>>>,
    }

    impl ShmMemory for FakeMemory {
        fn shmid(&self) -> u32 {
            self.shmid
        }

        fn size(&self) -> usize {
            self.size
        }
    }

    impl Drop for FakeMemory {
        fn drop(&mut self) {
            self.freed.lock().push(self.shmid);
        }
    }

    impl ShmAllocator for FakeAllocator {
        type Memory = FakeMemory;

        fn allocate(&self, size: usize) -> Result<FakeMemory> {
            let mut next = self.next.lock();
            *next += 1;
            Ok(FakeMemory {
                shmid: *next,
                size,
                freed: self.freed.clone(),
            })
        }
    }

    fn pool() -> (FakeDisplay, FakeAllocator, ShmPool<FakeAllocator>) {
        let allocator = FakeAllocator::default();
        let pool = ShmPool::new(allocator.clone(), MAX_IDLE_SEGMENTS);
        (FakeDisplay::new(), allocator, pool)
    }

    #[test]
    fn test_new_segment_is_attached_with_exact_size() {
        let (conn, _, mut pool) = pool();

        let seg = pool.acquire(&conn, 4096).unwrap();

        assert_eq!(seg.size(), 4096);
        assert_eq!(conn.attached(), vec![(seg.xid(), seg.memory().shmid())]);
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn test_release_then_acquire_reuses_segment() {
        let (conn, _, mut pool) = pool();

        let seg = pool.acquire(&conn, 1024).unwrap();
        let xid = seg.xid();
        pool.release(&conn, seg).unwrap();

        let again = pool.acquire(&conn, 1024).unwrap();
        assert_eq!(again.xid(), xid);
        assert_eq!(conn.attached().len(), 1);
    }

    #[test]
    fn test_acquire_is_first_fit() {
        let (conn, _, mut pool) = pool();

        let big = pool.acquire(&conn, 8000).unwrap();
        let small = pool.acquire(&conn, 2000).unwrap();
        let big_xid = big.xid();
        pool.release(&conn, big).unwrap();
        pool.release(&conn, small).unwrap();

        // Both fit; the earlier idle entry wins even though it is larger
        let seg = pool.acquire(&conn, 1000).unwrap();
        assert_eq!(seg.xid(), big_xid);
        assert_eq!(pool.idle_len(), 1);
    }

    #[test]
    fn test_too_small_segments_are_skipped() {
        let (conn, _, mut pool) = pool();

        let seg = pool.acquire(&conn, 100).unwrap();
        pool.release(&conn, seg).unwrap();

        let bigger = pool.acquire(&conn, 200).unwrap();
        assert_eq!(bigger.size(), 200);
        assert_eq!(pool.idle_len(), 1);
        assert_eq!(conn.attached().len(), 2);
    }

    #[test]
    fn test_idle_count_never_exceeds_capacity() {
        let (conn, _, mut pool) = pool();

        let segments: Vec<_> = (0..25)
            .map(|i| pool.acquire(&conn, 64 * (i + 1)).unwrap())
            .collect();
        for seg in segments {
            pool.release(&conn, seg).unwrap();
            assert!(pool.idle_len() <= MAX_IDLE_SEGMENTS);
        }
        assert_eq!(pool.idle_len(), MAX_IDLE_SEGMENTS);
    }

    #[test]
    fn test_eviction_is_insertion_order() {
        let (conn, allocator, mut pool) = pool();

        // Sizes deliberately descending so size order and insertion order differ
        let segments: Vec<_> = (0..12)
            .map(|i| pool.acquire(&conn, 10_000 - i * 100).unwrap())
            .collect();
        let xids: Vec<u32> = segments.iter().map(|s| s.xid()).collect();
        let shmids: Vec<u32> = segments.iter().map(|s| s.memory().shmid()).collect();

        for seg in segments {
            pool.release(&conn, seg).unwrap();
        }

        assert_eq!(conn.detached(), xids[..2].to_vec());
        assert_eq!(*allocator.freed.lock(), shmids[..2].to_vec());
    }

    #[test]
    fn test_drain_frees_everything() {
        let (conn, allocator, mut pool) = pool();

        let a = pool.acquire(&conn, 10).unwrap();
        let b = pool.acquire(&conn, 20).unwrap();
        pool.release(&conn, a).unwrap();
        pool.release(&conn, b).unwrap();

        pool.drain(&conn).unwrap();
        assert_eq!(pool.idle_len(), 0);
        assert_eq!(conn.detached().len(), 2);
        assert_eq!(allocator.freed.lock().len(), 2);
    }
}
