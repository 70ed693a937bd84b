//! Sharing detection: the identity-keyed seen table and the scan pass that
//! populates it ahead of a sharing-aware write.

use crate::runtime::heap::{Cell, Heap, ObjRef};

use super::Value;

/// Datum for an object seen exactly once; printed plainly.
pub const NONDEFINING_DATUM: i32 = 0;
/// Datum for an object seen again during the scan. Emission replaces it with
/// a positive label the first time it actually prints the object.
pub const DEFINING_DATUM: i32 = -1;

const INITIAL_SIZE: usize = 1 << 8;
const EMPTY_KEY: u32 = u32::MAX;
const GOLDEN_RATIO: u32 = 2_654_435_761;

#[derive(Clone, Copy)]
struct Entry {
    key: u32,
    datum: i32,
}

const EMPTY_ENTRY: Entry = Entry {
    key: EMPTY_KEY,
    datum: NONDEFINING_DATUM,
};

enum Slot {
    Vacant(usize),
    Occupied(usize),
}

/// Open-addressing map from object identity to sharing state.
///
/// Capacity is always a power of two and population never exceeds 2/3 of it.
/// Nothing is ever deleted within one write, so linear probing needs no
/// tombstones.
pub struct SeenTable {
    ents: Box<[Entry]>,
    used: usize,
}

impl SeenTable {
    pub fn new() -> Self {
        Self {
            ents: vec![EMPTY_ENTRY; INITIAL_SIZE].into_boxed_slice(),
            used: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn len(&self) -> usize {
        self.used
    }

    /// Registers `key`, returning `None` on first sight. A repeat visit
    /// returns the existing datum for the caller to update.
    pub fn insert(&mut self, key: ObjRef) -> Option<&mut i32> {
        match self.probe(key.raw()) {
            Slot::Occupied(i) => Some(&mut self.ents[i].datum),
            Slot::Vacant(i) => {
                self.ents[i] = Entry {
                    key: key.raw(),
                    datum: NONDEFINING_DATUM,
                };
                self.used += 1;
                if self.used * 3 > self.ents.len() * 2 {
                    self.grow();
                }
                None
            }
        }
    }

    pub fn find(&self, key: ObjRef) -> Option<i32> {
        match self.probe(key.raw()) {
            Slot::Occupied(i) => Some(self.ents[i].datum),
            Slot::Vacant(_) => None,
        }
    }

    pub fn find_mut(&mut self, key: ObjRef) -> Option<&mut i32> {
        match self.probe(key.raw()) {
            Slot::Occupied(i) => Some(&mut self.ents[i].datum),
            Slot::Vacant(_) => None,
        }
    }

    fn probe(&self, key: u32) -> Slot {
        debug_assert_ne!(key, EMPTY_KEY);
        let mask = self.ents.len() - 1;
        let hash = key.wrapping_mul(GOLDEN_RATIO) as usize;
        for i in 0..self.ents.len() {
            let idx = hash.wrapping_add(i) & mask;
            let ent = self.ents[idx];
            if ent.key == EMPTY_KEY {
                return Slot::Vacant(idx);
            }
            if ent.key == key {
                return Slot::Occupied(idx);
            }
        }
        // The growth policy keeps at least a third of the slots free, so a
        // full sweep means the table is corrupt.
        log::error!("seen table probe exhausted all {} slots", self.ents.len());
        std::process::abort();
    }

    fn grow(&mut self) {
        let new_size = self.ents.len() * 2;
        let old = std::mem::replace(
            &mut self.ents,
            vec![EMPTY_ENTRY; new_size].into_boxed_slice(),
        );
        self.used = 0;
        for ent in old.iter().filter(|ent| ent.key != EMPTY_KEY) {
            match self.probe(ent.key) {
                Slot::Vacant(i) => {
                    self.ents[i] = *ent;
                    self.used += 1;
                }
                Slot::Occupied(_) => unreachable!("duplicate key while rehashing"),
            }
        }
        log::trace!("seen table grown to {new_size} slots ({} used)", self.used);
    }
}

/// State owned by one sharing-aware write: the seen table plus the next
/// `#N=` label. Created fresh per top-level call, dropped on every path out.
pub struct WriteSsCtx {
    seen: SeenTable,
    next_index: i32,
}

impl WriteSsCtx {
    pub fn new() -> Self {
        Self {
            seen: SeenTable::new(),
            next_index: 1,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub(crate) fn tracked(&self) -> usize {
        self.seen.len()
    }

    /// Label state for `key` during emission: positive means already defined
    /// (emit a back-reference), negative means defining right now (the
    /// caller emits the label and then the content), zero means print
    /// plainly.
    pub(crate) fn shared_index(&mut self, key: ObjRef) -> i32 {
        match self.seen.find_mut(key) {
            Some(datum) if *datum == DEFINING_DATUM => {
                *datum = self.next_index;
                self.next_index += 1;
                -*datum
            }
            Some(datum) => *datum,
            None => NONDEFINING_DATUM,
        }
    }

    /// Records every sharing-eligible object reachable from `root`, marking
    /// objects reached twice as defining.
    ///
    /// The walk never descends into an already-recorded object; that check is
    /// what bounds cycles. Pair spines are walked iteratively so long lists
    /// cost constant stack.
    pub fn scan(&mut self, heap: &Heap, root: Value) {
        let mut obj = root;
        while let Some(r) = heap.pair_ref(obj) {
            if let Some(datum) = self.seen.insert(r) {
                *datum = DEFINING_DATUM;
                return;
            }
            let (car, cdr) = heap.pair_parts(r);
            self.scan(heap, car);
            obj = cdr;
        }

        let Some(r) = interesting_ref(heap, obj) else {
            return;
        };
        if let Some(datum) = self.seen.insert(r) {
            *datum = DEFINING_DATUM;
            return;
        }
        match heap.cell(r) {
            // The environment is never printed, so it is not tracked either.
            Cell::Closure { exp, .. } => self.scan(heap, *exp),
            Cell::Values(vals) => self.scan(heap, *vals),
            Cell::Vector(items) => {
                for &item in items {
                    self.scan(heap, item);
                }
            }
            // Tracked for identity, but characters are not separate objects.
            Cell::Str(_) => {}
            Cell::Pair { .. } => unreachable!("pairs are consumed by the spine walk"),
            Cell::Symbol { .. }
            | Cell::Subr { .. }
            | Cell::Continuation
            | Cell::Port(_)
            | Cell::CPointer(_)
            | Cell::CFuncPointer(_) => unreachable!("not sharing-eligible"),
        }
    }
}

/// A sharing-eligible object: pair, non-empty string, vector, closure or
/// value packet. Everything else never receives a label.
pub(crate) fn interesting_ref(heap: &Heap, v: Value) -> Option<ObjRef> {
    let Value::Obj(r) = v else {
        return None;
    };
    match heap.cell(r) {
        Cell::Pair { .. } | Cell::Vector(_) | Cell::Closure { .. } | Cell::Values(_) => Some(r),
        Cell::Str(s) => (!s.is_empty()).then_some(r),
        Cell::Symbol { .. }
        | Cell::Subr { .. }
        | Cell::Continuation
        | Cell::Port(_)
        | Cell::CPointer(_)
        | Cell::CFuncPointer(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_refs(heap: &mut Heap, count: usize) -> Vec<ObjRef> {
        (0..count)
            .map(|i| {
                let p = heap.cons(Value::Int(i as i64), Value::Nil);
                heap.pair_ref(p).unwrap()
            })
            .collect()
    }

    #[test]
    fn insert_distinguishes_fresh_from_repeat() {
        let mut heap = Heap::new();
        let refs = pair_refs(&mut heap, 2);
        let mut table = SeenTable::new();

        assert!(table.insert(refs[0]).is_none());
        assert!(table.insert(refs[1]).is_none());
        assert_eq!(table.len(), 2);

        let datum = table.insert(refs[0]).expect("repeat visit");
        assert_eq!(*datum, NONDEFINING_DATUM);
        *datum = DEFINING_DATUM;
        assert_eq!(table.find(refs[0]), Some(DEFINING_DATUM));
        assert_eq!(table.find(refs[1]), Some(NONDEFINING_DATUM));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn find_misses_unregistered_keys() {
        let mut heap = Heap::new();
        let refs = pair_refs(&mut heap, 2);
        let mut table = SeenTable::new();
        assert!(table.insert(refs[0]).is_none());
        assert_eq!(table.find(refs[1]), None);
    }

    #[test]
    fn growth_preserves_every_entry_and_datum() {
        let mut heap = Heap::new();
        // Enough to push the table through several doublings.
        let refs = pair_refs(&mut heap, 1000);
        let mut table = SeenTable::new();

        for (i, &r) in refs.iter().enumerate() {
            assert!(table.insert(r).is_none());
            if i % 3 == 0 {
                *table.insert(r).unwrap() = DEFINING_DATUM;
            }
        }

        assert_eq!(table.len(), 1000);
        for (i, &r) in refs.iter().enumerate() {
            let expected = if i % 3 == 0 {
                DEFINING_DATUM
            } else {
                NONDEFINING_DATUM
            };
            assert_eq!(table.find(r), Some(expected), "entry {i} lost or changed");
        }
    }

    #[test]
    fn scan_marks_doubly_referenced_objects() {
        let mut heap = Heap::new();
        let shared = heap.list(&[Value::Int(1), Value::Int(2)]);
        let holder = heap.list(&[shared, shared]);

        let mut ctx = WriteSsCtx::new();
        ctx.scan(&heap, holder);

        let r = heap.pair_ref(shared).unwrap();
        assert_eq!(ctx.seen.find(r), Some(DEFINING_DATUM));
        // The holder itself is reached once.
        let h = heap.pair_ref(holder).unwrap();
        assert_eq!(ctx.seen.find(h), Some(NONDEFINING_DATUM));
    }

    #[test]
    fn scan_terminates_on_cycles() {
        let mut heap = Heap::new();
        let sym = heap.intern("a");
        let p = heap.cons(sym, Value::Nil);
        heap.set_cdr(p, p);

        let mut ctx = WriteSsCtx::new();
        ctx.scan(&heap, p);

        let r = heap.pair_ref(p).unwrap();
        assert_eq!(ctx.seen.find(r), Some(DEFINING_DATUM));
        assert_eq!(ctx.tracked(), 1);
    }

    #[test]
    fn scan_ignores_atoms_and_closure_environments() {
        let mut heap = Heap::new();
        let sym = heap.intern("lambda");
        let exp = heap.list(&[sym, Value::Int(1)]);
        let env = heap.list(&[Value::Int(9)]);
        let clo = heap.closure(exp, env);
        let holder = heap.list(&[Value::Int(7), clo]);

        let mut ctx = WriteSsCtx::new();
        ctx.scan(&heap, holder);

        let env_ref = heap.pair_ref(env).unwrap();
        assert_eq!(ctx.seen.find(env_ref), None);
        // holder spine (2 pairs) + closure + exp spine (2 pairs).
        assert_eq!(ctx.tracked(), 5);
    }

    #[test]
    fn empty_strings_are_not_tracked() {
        let mut heap = Heap::new();
        let empty = heap.string("");
        let full = heap.string("x");
        let holder = heap.list(&[empty, full]);

        let mut ctx = WriteSsCtx::new();
        ctx.scan(&heap, holder);

        assert_eq!(ctx.seen.find(empty.obj().unwrap()), None);
        assert_eq!(ctx.seen.find(full.obj().unwrap()), Some(NONDEFINING_DATUM));
    }

    #[test]
    fn shared_index_assigns_labels_in_request_order() {
        let mut heap = Heap::new();
        let refs = pair_refs(&mut heap, 2);
        let mut ctx = WriteSsCtx::new();
        assert!(ctx.seen.insert(refs[0]).is_none());
        *ctx.seen.insert(refs[0]).unwrap() = DEFINING_DATUM;
        assert!(ctx.seen.insert(refs[1]).is_none());
        *ctx.seen.insert(refs[1]).unwrap() = DEFINING_DATUM;

        assert_eq!(ctx.shared_index(refs[1]), -1);
        assert_eq!(ctx.shared_index(refs[0]), -2);
        assert_eq!(ctx.shared_index(refs[1]), 1);
        assert_eq!(ctx.shared_index(refs[0]), 2);
    }
}
