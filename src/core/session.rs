// This module provides arena-based compilation session management using the bumpalo crate.
// A CompilationSession owns the lifetime of one kernel compilation: the parsed kernel AST,
// parameter scopes and interned identifiers are all allocated in the session arena and
// dropped together when the compile call returns. The session also records statistics
// (passes run, IR bytes produced, symbols emitted) that the pipeline logs at debug level
// and that tests use to check which passes actually executed.

//! Arena-based compilation session management.
//!
//! All front-end objects of one compilation are tied to the session
//! lifetime, so AST nodes can borrow from each other freely.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// String interning for identifiers.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Record that a pipeline pass ran.
    pub fn record_pass(&self, name: &'static str) {
        let mut stats = self.stats.borrow_mut();
        stats.passes_run.push(name);
    }

    /// Record a finished kernel and the size of its IR text.
    pub fn record_kernel_compiled(&self, symbol: &str, ir_bytes: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.kernels_compiled += 1;
        stats.ir_bytes += ir_bytes;
        stats.last_symbol = symbol.to_string();
    }

    /// Snapshot of the compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of kernels compiled.
    pub kernels_compiled: usize,

    /// Total IR text produced (bytes).
    pub ir_bytes: usize,

    /// Names of the passes that ran, in order.
    pub passes_run: Vec<&'static str>,

    /// Symbol of the most recent kernel.
    pub last_symbol: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Kernels compiled: {}", self.kernels_compiled)?;
        writeln!(f, "  IR size: {} bytes", self.ir_bytes)?;

        if !self.last_symbol.is_empty() {
            writeln!(f, "  Last symbol: {}", self.last_symbol)?;
        }

        if !self.passes_run.is_empty() {
            writeln!(f, "  Passes: {}", self.passes_run.join(" -> "))?;
        }

        Ok(())
    }
}
