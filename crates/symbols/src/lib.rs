//! Module symbol tables and address/name resolution.
//!
//! Translates `module!name` identifiers to runtime addresses at compile time,
//! and answers "address -> nearest symbol + offset" queries at event time for
//! the disassembler view. PDB parsing itself is an external collaborator
//! (out of scope per the core spec): callers supply a [`SymbolBackend`].

mod error;
mod module;
mod nearest;

pub use error::ResolveError;
pub use module::SymbolModuleEntry;
pub use nearest::NearestSymbol;

use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Default maximum byte distance `address_to_nearest` will still report a
/// match for, once past the owning symbol's declared byte size.
pub const DEFAULT_MAX_DISTANCE: u64 = 0xFFFF;

/// Kernel module aliases that fold to the canonical name `nt` before lookup.
const NT_ALIASES: &[&str] = &["nt", "ntkrnlmp", "ntoskrnl", "ntkrnlpa", "ntkrpamp"];

fn canonical_module_name(name: &str) -> String {
    if NT_ALIASES.iter().any(|a| a.eq_ignore_ascii_case(name)) {
        "nt".to_string()
    } else {
        name.to_string()
    }
}

/// A parsed symbol entry loaded from an image's debug info: name plus the
/// byte size it claims to span, used for nearest-symbol distance checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub byte_size: u64,
}

/// Anything capable of turning a `(image_path, pdb_path)` pair into a flat
/// list of `(module_relative_address, SymbolEntry)` pairs. Backed in
/// production by the out-of-scope PDB downloader/parser; backed in tests by
/// an in-memory map.
pub trait SymbolBackend {
    fn parse_symbols(
        &self,
        image_path: &str,
        pdb_path: &str,
    ) -> Result<Vec<(u64, SymbolEntry)>, ResolveError>;
}

/// Holds the set of loaded module entries plus a module-base-relative
/// nearest-symbol index, and answers name/address resolution queries.
pub struct SymbolResolver {
    modules: Vec<SymbolModuleEntry>,
    /// module index -> (offset within module -> symbol)
    per_module_index: Vec<BTreeMap<u64, SymbolEntry>>,
    /// canonical module name -> index into `modules`
    name_index: BTreeMap<String, usize>,
    max_distance: u64,
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            per_module_index: Vec::new(),
            name_index: BTreeMap::new(),
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }

    pub fn with_max_distance(max_distance: u64) -> Self {
        Self {
            max_distance,
            ..Self::new()
        }
    }

    /// Loads symbols for one module via `backend`. Idempotent on
    /// `(module_base, guid, age)`: a duplicate load is a no-op.
    pub fn load_symbol(
        &mut self,
        backend: &dyn SymbolBackend,
        entry: SymbolModuleEntry,
    ) -> Result<(), ResolveError> {
        if self.modules.iter().any(|m| {
            m.module_base == entry.module_base
                && m.pdb_guid_age == entry.pdb_guid_age
        }) {
            debug!(module = %entry.name(), "duplicate load_symbol, ignoring");
            return Ok(());
        }

        let parsed = backend.parse_symbols(&entry.image_path, &entry.pdb_path)?;
        let canonical = canonical_module_name(&entry.name());
        let idx = self.modules.len();

        let mut index = BTreeMap::new();
        for (offset, sym) in parsed {
            index.insert(offset, sym);
        }

        self.modules.push(entry);
        self.per_module_index.push(index);
        self.name_index.insert(canonical, idx);

        Ok(())
    }

    pub fn unload_all(&mut self) {
        self.modules.clear();
        self.per_module_index.clear();
        self.name_index.clear();
    }

    pub fn query_count(&self) -> usize {
        self.modules.len()
    }

    pub fn enumerate(&self) -> impl Iterator<Item = &SymbolModuleEntry> {
        self.modules.iter()
    }

    /// `module!name` -> address. Strips a leading `nt!` / kernel alias
    /// before lookup; otherwise splits on `!`. Tries an exact-case match
    /// first, then falls back to a case-insensitive scan.
    pub fn name_to_address(&self, spelling: &str) -> Option<u64> {
        let (module_part, symbol_part) = spelling.split_once('!')?;
        let canonical = canonical_module_name(module_part);
        let module_idx = *self.name_index.get(&canonical)?;
        let index = self.per_module_index.get(module_idx)?;
        let base = self.modules[module_idx].module_base;

        if let Some((offset, _)) = index.iter().find(|(_, s)| s.name == symbol_part) {
            return Some(base + offset);
        }
        index
            .iter()
            .find(|(_, s)| s.name.eq_ignore_ascii_case(symbol_part))
            .map(|(offset, _)| base + offset)
    }

    /// `address -> (name, delta, module_name)` for the largest symbol entry
    /// whose module-relative offset is `<= ip`. Reports a match if `ip` falls
    /// within the symbol's declared size, or within `max_distance` bytes past
    /// it (distance measured from the end of the symbol, not its start).
    pub fn address_to_nearest(&self, ip: u64) -> Option<NearestSymbol> {
        for (module_idx, module) in self.modules.iter().enumerate() {
            let base = module.module_base;
            if ip < base {
                continue;
            }
            let rel = ip - base;
            let index = &self.per_module_index[module_idx];

            let Some((&offset, sym)) = index.range(..=rel).next_back() else {
                continue;
            };
            let span_end = offset + sym.byte_size;
            if rel <= span_end {
                trace!(module = %module.name(), symbol = %sym.name, "exact nearest-symbol hit");
                return Some(NearestSymbol {
                    name: sym.name.clone(),
                    delta: rel - offset,
                    module: module.name(),
                });
            }
            let past_distance = rel - span_end;
            if past_distance <= self.max_distance {
                return Some(NearestSymbol {
                    name: sym.name.clone(),
                    delta: sym.byte_size + past_distance,
                    module: module.name(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend;
    impl SymbolBackend for FakeBackend {
        fn parse_symbols(
            &self,
            _image_path: &str,
            _pdb_path: &str,
        ) -> Result<Vec<(u64, SymbolEntry)>, ResolveError> {
            Ok(vec![
                (
                    0x1000,
                    SymbolEntry {
                        name: "PsInitialSystemProcess".into(),
                        byte_size: 8,
                    },
                ),
                (
                    0x2000,
                    SymbolEntry {
                        name: "PsActiveProcessHead".into(),
                        byte_size: 8,
                    },
                ),
            ])
        }
    }

    fn loaded_resolver() -> SymbolResolver {
        let mut r = SymbolResolver::new();
        r.load_symbol(
            &FakeBackend,
            SymbolModuleEntry {
                module_base: 0xfffff800_00000000,
                image_name: "ntoskrnl.exe".into(),
                image_path: "C:\\Windows\\System32\\ntoskrnl.exe".into(),
                pdb_guid_age: (0xdeadbeef, 1),
                pdb_path: "ntoskrnl.pdb".into(),
                is_user_mode: false,
            },
        )
        .unwrap();
        r
    }

    #[test]
    fn kernel_alias_folds_to_nt() {
        let r = loaded_resolver();
        assert_eq!(
            r.name_to_address("nt!PsInitialSystemProcess"),
            Some(0xfffff800_00000000 + 0x1000)
        );
        assert_eq!(
            r.name_to_address("ntkrnlmp!PsInitialSystemProcess"),
            Some(0xfffff800_00000000 + 0x1000)
        );
    }

    #[test]
    fn unknown_module_resolves_to_none() {
        let r = loaded_resolver();
        assert_eq!(r.name_to_address("unknown!Thing"), None);
    }

    #[test]
    fn case_insensitive_fallback() {
        let r = loaded_resolver();
        assert_eq!(
            r.name_to_address("nt!psinitialsystemprocess"),
            Some(0xfffff800_00000000 + 0x1000)
        );
    }

    #[test]
    fn nearest_symbol_exact_and_distance() {
        let r = loaded_resolver();
        let base = 0xfffff800_00000000u64;
        let exact = r.address_to_nearest(base + 0x1004).unwrap();
        assert_eq!(exact.name, "PsInitialSystemProcess");
        assert_eq!(exact.delta, 4);

        let far = r.address_to_nearest(base + 0x1008 + 0xFFFF).unwrap();
        assert_eq!(far.name, "PsInitialSystemProcess");

        assert!(r.address_to_nearest(base + 0x1008 + 0xFFFF + 1).is_none()
            || r.address_to_nearest(base + 0x1008 + 0xFFFF + 1).unwrap().name == "PsActiveProcessHead");
    }

    #[test]
    fn duplicate_load_is_idempotent() {
        let mut r = SymbolResolver::new();
        let entry = SymbolModuleEntry {
            module_base: 0x1000,
            image_name: "nt".into(),
            image_path: "nt".into(),
            pdb_guid_age: (1, 1),
            pdb_path: "nt.pdb".into(),
            is_user_mode: false,
        };
        r.load_symbol(&FakeBackend, entry.clone()).unwrap();
        r.load_symbol(&FakeBackend, entry).unwrap();
        assert_eq!(r.query_count(), 1);
    }

    #[test]
    fn unload_all_clears_state() {
        let mut r = loaded_resolver();
        r.unload_all();
        assert_eq!(r.query_count(), 0);
        assert_eq!(r.name_to_address("nt!PsInitialSystemProcess"), None);
    }
}
