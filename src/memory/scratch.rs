use indexmap::IndexMap;
use log::trace;

use crate::common::{Address, BuildError, BuildResult};
use crate::env::DebugInfo;
use crate::ir::{LoadSlot, Operation, ValuSlot};

/// Bump allocator over the scratch arena, with constant-value caching so
/// the scheduler sees maximal false-free dependency graphs.
///
/// Allocation never shrinks or reuses: once a word is handed out, its
/// semantic owner is fixed for the kernel's lifetime.
pub struct ScratchAllocator {
    vlen: usize,
    capacity: usize,
    ptr: Address,
    named: IndexMap<String, Address>,
    debug: IndexMap<Address, (String, usize)>,
    const_scalar: IndexMap<i64, Address>,
    const_vec: IndexMap<i64, Address>,
}

impl ScratchAllocator {
    pub fn new(vlen: usize, capacity: usize) -> Self {
        ScratchAllocator {
            vlen,
            capacity,
            ptr: 0,
            named: IndexMap::new(),
            debug: IndexMap::new(),
            const_scalar: IndexMap::new(),
            const_vec: IndexMap::new(),
        }
    }

    pub fn ptr(&self) -> Address {
        self.ptr
    }

    /// Address a previously named allocation was given.
    pub fn named(&self, name: &str) -> Option<Address> {
        self.named.get(name).copied()
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo { scratch_map: self.debug.clone() }
    }

    /// Allocate `length` fresh words. If `name` is given, records both the
    /// name→address mapping and the debug `(name, length)` annotation.
    pub fn alloc(&mut self, name: Option<&str>, length: usize) -> BuildResult<Address> {
        let addr = self.ptr;
        let new_ptr = self.ptr as usize + length;
        if new_ptr > self.capacity {
            return Err(BuildError::ArenaOverflow {
                requested: new_ptr,
                available: self.capacity,
            });
        }
        if let Some(name) = name {
            self.named.insert(name.to_string(), addr);
            self.debug.insert(addr, (name.to_string(), length));
        }
        self.ptr = new_ptr as Address;
        trace!("alloc({name:?}, {length}) -> {addr}");
        Ok(addr)
    }

    /// Get or create a scalar constant. Returns the cached address and an
    /// empty init-op list on a cache hit; on a miss, allocates one word and
    /// returns the single `load const` op that must be emitted before any
    /// reference to the returned address.
    pub fn scratch_const(&mut self, value: i64) -> BuildResult<(Address, Vec<Operation>)> {
        if let Some(&addr) = self.const_scalar.get(&value) {
            return Ok((addr, Vec::new()));
        }
        let addr = self.alloc(None, 1)?;
        self.const_scalar.insert(value, addr);
        trace!("scratch_const({value}) -> {addr} (new)");
        let init = vec![Operation::load(LoadSlot::Const { dst: addr, imm: value })];
        Ok((addr, init))
    }

    /// Get or create a `VLEN`-wide broadcast constant. Ensures the backing
    /// scalar constant exists first, so a miss returns the scalar's init op
    /// (if any) followed by the `vbroadcast` op.
    pub fn vec_const(&mut self, value: i64) -> BuildResult<(Address, Vec<Operation>)> {
        if let Some(&addr) = self.const_vec.get(&value) {
            return Ok((addr, Vec::new()));
        }
        let (scalar_addr, mut init) = self.scratch_const(value)?;
        let vec_addr = self.alloc(Some(&format!("vc_{value}")), self.vlen)?;
        self.const_vec.insert(value, vec_addr);
        trace!("vec_const({value}) -> {vec_addr} (new)");
        init.push(Operation::valu(ValuSlot::VBroadcast { dst: vec_addr, src: scalar_addr }));
        Ok((vec_addr, init))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_const_dedupes() {
        let mut a = ScratchAllocator::new(8, 1024);
        let (addr1, ops1) = a.scratch_const(42).unwrap();
        assert_eq!(ops1.len(), 1);
        let (addr2, ops2) = a.scratch_const(42).unwrap();
        assert_eq!(addr1, addr2);
        assert!(ops2.is_empty());
    }

    #[test]
    fn vec_const_reuses_scalar_and_broadcasts_once() {
        let mut a = ScratchAllocator::new(8, 1024);
        let (vaddr, ops) = a.vec_const(7).unwrap();
        assert_eq!(ops.len(), 2); // load const + vbroadcast
        let (vaddr2, ops2) = a.vec_const(7).unwrap();
        assert_eq!(vaddr, vaddr2);
        assert!(ops2.is_empty());
        // A plain scalar lookup for the same value must also be cached now.
        let (_, ops3) = a.scratch_const(7).unwrap();
        assert!(ops3.is_empty());
    }

    #[test]
    fn distinct_values_get_distinct_addresses() {
        let mut a = ScratchAllocator::new(8, 1024);
        let (addr1, _) = a.scratch_const(1).unwrap();
        let (addr2, _) = a.scratch_const(2).unwrap();
        assert_ne!(addr1, addr2);
    }

    #[test]
    fn named_alloc_is_recorded_for_debug() {
        let mut a = ScratchAllocator::new(8, 1024);
        let addr = a.alloc(Some("tmp1"), 1).unwrap();
        assert_eq!(a.named("tmp1"), Some(addr));
        assert_eq!(a.debug_info().scratch_map.get(&addr), Some(&("tmp1".to_string(), 1)));
    }

    #[test]
    fn overflow_is_fatal() {
        let mut a = ScratchAllocator::new(8, 4);
        assert!(a.alloc(None, 4).is_ok());
        let err = a.alloc(None, 1).unwrap_err();
        assert_eq!(err, BuildError::ArenaOverflow { requested: 5, available: 4 });
    }

    #[test]
    fn ptr_is_monotonic() {
        let mut a = ScratchAllocator::new(8, 1024);
        let mut last = a.ptr();
        for _ in 0..10 {
            let addr = a.alloc(None, 3).unwrap();
            assert!(addr >= last);
            last = a.ptr();
        }
    }
}
