//! Register allocation.
//!
//! Register 0 holds return values and registers `1..=fixed` hold `self`,
//! parameters and locals. Everything above is the volatile pool used for
//! temporaries. The allocator tracks the live volatile registers as an
//! ordered set; `acquire` hands out the lowest free one and
//! `acquire_range` a contiguous block above the highest live one, which is
//! where call arguments go.

use std::collections::BTreeSet;

use tracing::trace;
use zlang_core::InternalError;

use crate::ir::Register;

/// Volatile register pool of one function.
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    function: String,
    first_volatile: u16,
    live: BTreeSet<u8>,
    high_water: u8,
}

/// Saved live set, see [`RegisterAllocator::snapshot`].
#[derive(Debug, Clone)]
pub struct LiveSet(BTreeSet<u8>);

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start allocating for `function` whose first `fixed` registers after
    /// register 0 are taken.
    pub fn reset(&mut self, function: &str, fixed: u32) -> Result<(), InternalError> {
        if fixed >= u32::from(Register::MAX.0) {
            return Err(InternalError::RegisterPoolExhausted {
                function: function.to_string(),
            });
        }
        self.function = function.to_string();
        self.first_volatile = fixed as u16 + 1;
        self.live.clear();
        self.high_water = fixed as u8;
        Ok(())
    }

    fn exhausted(&self) -> InternalError {
        InternalError::RegisterPoolExhausted {
            function: self.function.clone(),
        }
    }

    /// The lowest free volatile register.
    pub fn acquire(&mut self) -> Result<Register, InternalError> {
        let mut candidate = self.first_volatile;
        for live in &self.live {
            if u16::from(*live) > candidate {
                break;
            }
            if u16::from(*live) == candidate {
                candidate += 1;
            }
        }
        if candidate > u16::from(Register::MAX.0) {
            return Err(self.exhausted());
        }
        let register = candidate as u8;
        self.live.insert(register);
        self.high_water = self.high_water.max(register);
        trace!(function = %self.function, register, "acquire");
        Ok(Register(register))
    }

    /// Release `released`, then acquire; the result may reuse one of them.
    pub fn acquire_after_release(&mut self, released: &[Register]) -> Result<Register, InternalError> {
        for register in released {
            self.release(*register);
        }
        self.acquire()
    }

    /// `count` contiguous registers after the highest live one.
    pub fn acquire_range(&mut self, count: usize) -> Result<Vec<Register>, InternalError> {
        let start = self
            .live
            .last()
            .map_or(self.first_volatile, |highest| u16::from(*highest) + 1)
            .max(self.first_volatile);
        if start as usize + count > usize::from(Register::MAX.0) + 1 {
            return Err(self.exhausted());
        }
        let range: Vec<Register> = (0..count).map(|i| Register((start as usize + i) as u8)).collect();
        for register in &range {
            self.live.insert(register.0);
            self.high_water = self.high_water.max(register.0);
        }
        trace!(function = %self.function, start, count, "acquire range");
        Ok(range)
    }

    /// Return a register to the pool. Fixed registers are ignored.
    pub fn release(&mut self, register: Register) {
        if self.live.remove(&register.0) {
            trace!(function = %self.function, register = register.0, "release");
        }
    }

    /// Whether `register` is a volatile register currently handed out.
    pub fn is_live(&self, register: Register) -> bool {
        self.live.contains(&register.0)
    }

    /// Number of live volatile registers.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// The highest register used so far, fixed ones included.
    pub fn high_water(&self) -> u8 {
        self.high_water
    }

    pub fn snapshot(&self) -> LiveSet {
        LiveSet(self.live.clone())
    }

    /// Forget everything acquired since `snapshot`.
    pub fn restore(&mut self, snapshot: LiveSet) {
        self.live = snapshot.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_pool_starts_above_fixed_registers() {
        let mut registers = RegisterAllocator::new();
        registers.reset("f", 3).unwrap();
        assert_eq!(registers.acquire(), Ok(Register(4)));
        assert_eq!(registers.acquire(), Ok(Register(5)));
        assert_eq!(registers.high_water(), 5);
    }

    #[test]
    fn lowest_free_register_is_reused() {
        let mut registers = RegisterAllocator::new();
        registers.reset("f", 0).unwrap();
        let a = registers.acquire().unwrap();
        let b = registers.acquire().unwrap();
        let c = registers.acquire().unwrap();
        registers.release(b);
        assert_eq!(registers.acquire(), Ok(b));
        registers.release(a);
        registers.release(c);
        assert_eq!(registers.acquire_after_release(&[b]), Ok(a));
        assert_eq!(registers.live_count(), 1);
    }

    #[test]
    fn range_starts_after_highest_live() {
        let mut registers = RegisterAllocator::new();
        registers.reset("f", 2).unwrap();
        let a = registers.acquire().unwrap();
        let b = registers.acquire().unwrap();
        registers.release(a);
        let range = registers.acquire_range(3).unwrap();
        assert_eq!(range, vec![Register(b.0 + 1), Register(b.0 + 2), Register(b.0 + 3)]);
        assert!(registers.acquire_range(0).unwrap().is_empty());
        // The hole below the range is still handed out first.
        assert_eq!(registers.acquire(), Ok(a));
    }

    #[test]
    fn exhaustion_is_internal_error() {
        let mut registers = RegisterAllocator::new();
        registers.reset("big", 250).unwrap();
        for _ in 0..5 {
            registers.acquire().unwrap();
        }
        assert_eq!(
            registers.acquire(),
            Err(InternalError::RegisterPoolExhausted {
                function: "big".to_string()
            })
        );
        assert!(registers.acquire_range(1).is_err());
        assert!(registers.reset("huge", 255).is_err());
    }

    #[test]
    fn fixed_registers_are_never_released() {
        let mut registers = RegisterAllocator::new();
        registers.reset("f", 2).unwrap();
        registers.release(Register(1));
        assert_eq!(registers.acquire(), Ok(Register(3)));
        let saved = registers.snapshot();
        registers.acquire().unwrap();
        registers.restore(saved);
        assert_eq!(registers.live_count(), 1);
    }
}
