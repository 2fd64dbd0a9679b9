//! Fiber stacks.
//!
//! A stack is either a plain heap buffer or, when a guard page is asked for,
//! an anonymous mapping whose lowest page is `PROT_NONE`.

use crate::arch::{Context, fiber_start};
use log::warn;
use std::io;

pub(crate) struct Stack {
    memory: Memory,
}

enum Memory {
    Heap(Box<[u8]>),
    #[cfg(unix)]
    Mapped(mapped::MappedStack),
}

impl Stack {
    pub(crate) fn new(size: usize, guard_page: bool) -> io::Result<Stack> {
        if guard_page {
            #[cfg(unix)]
            return Ok(Stack {
                memory: Memory::Mapped(mapped::MappedStack::new(size)?),
            });
            #[cfg(not(unix))]
            warn!("guard pages are not supported on this platform, using a heap stack");
        }

        Ok(Stack {
            memory: Memory::Heap(vec![0u8; size].into_boxed_slice()),
        })
    }

    /// One past the highest usable byte. Stacks grow downward.
    fn top(&mut self) -> usize {
        match &mut self.memory {
            Memory::Heap(buf) => buf.as_mut_ptr() as usize + buf.len(),
            #[cfg(unix)]
            Memory::Mapped(map) => map.top(),
        }
    }

    /// Usable bytes, guard page excluded.
    pub(crate) fn len(&self) -> usize {
        match &self.memory {
            Memory::Heap(buf) => buf.len(),
            #[cfg(unix)]
            Memory::Mapped(map) => map.usable(),
        }
    }

    /// Lay a fresh start-up frame at the top of this stack and return the
    /// context that enters it. Anything a previous fiber left behind is
    /// abandoned.
    pub(crate) fn prepare(&mut self, home: usize) -> Context {
        let top = self.top();
        // Config validation guarantees room for the frame.
        unsafe { Context::new(top, fiber_start as usize, home) }
    }
}

#[cfg(unix)]
mod mapped {
    use super::warn;
    use std::io;
    use std::ptr::{self, NonNull};

    pub(super) struct MappedStack {
        ptr: NonNull<u8>,
        len: usize,
        page: usize,
    }

    fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    impl MappedStack {
        /// Maps at least `size` usable bytes plus one guard page below them.
        pub(super) fn new(size: usize) -> io::Result<MappedStack> {
            let page = page_size();

            // Round up to whole pages, then add the guard page.
            let len = size
                .checked_add(page - 1)
                .map(|len| len & !(page - 1))
                .and_then(|len| len.checked_add(page))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "stack size overflows the address space",
                    )
                })?;

            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANON,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let Some(ptr) = NonNull::new(ptr as *mut u8) else {
                return Err(io::Error::other("mmap returned null"));
            };

            // Dropping `stack` unmaps it if protecting fails.
            let stack = MappedStack { ptr, len, page };
            let rc = unsafe {
                libc::mprotect(ptr.as_ptr() as *mut libc::c_void, page, libc::PROT_NONE)
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(stack)
        }

        pub(super) fn top(&self) -> usize {
            self.ptr.as_ptr() as usize + self.len
        }

        pub(super) fn usable(&self) -> usize {
            self.len - self.page
        }
    }

    impl Drop for MappedStack {
        fn drop(&mut self) {
            let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
            if rc != 0 {
                warn!("failed to unmap fiber stack: {}", io::Error::last_os_error());
            }
        }
    }
}
