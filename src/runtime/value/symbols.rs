use crate::runtime::heap::{Cell, Heap};

use super::Value;

impl Heap {
    /// Returns the interned symbol for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Value {
        if let Some(&r) = self.interned.get(name) {
            return Value::Obj(r);
        }
        let r = self.alloc(Cell::Symbol {
            name: name.into(),
            vcell: Value::Unbound,
        });
        self.interned.insert(name.into(), r);
        Value::Obj(r)
    }

    pub fn is_symbol(&self, v: Value) -> bool {
        matches!(v, Value::Obj(r) if matches!(self.cell(r), Cell::Symbol { .. }))
    }

    pub fn symbol_name(&self, v: Value) -> &str {
        let Value::Obj(r) = v else {
            panic!("symbol accessor on a non-symbol")
        };
        match self.cell(r) {
            Cell::Symbol { name, .. } => name,
            _ => panic!("symbol accessor on a non-symbol"),
        }
    }

    /// Binds `name`'s value cell to `value`.
    pub fn define(&mut self, name: &str, value: Value) {
        let sym = self.intern(name);
        let r = sym.obj().expect("interned symbol is always a cell");
        let Cell::Symbol { vcell, .. } = self.cell_mut(r) else {
            unreachable!()
        };
        *vcell = value;
    }

    pub fn symbol_value(&self, v: Value) -> Value {
        let Value::Obj(r) = v else {
            panic!("symbol accessor on a non-symbol")
        };
        match self.cell(r) {
            Cell::Symbol { vcell, .. } => *vcell,
            _ => panic!("symbol accessor on a non-symbol"),
        }
    }

    /// Finds an interned symbol whose value cell holds exactly `val`.
    ///
    /// Used to give builtins a printable name; which symbol wins when several
    /// share a binding is unspecified.
    pub fn symbol_bound_to(&self, val: Value) -> Option<&str> {
        if val == Value::Unbound {
            return None;
        }
        self.interned.iter().find_map(|(name, &r)| match self.cell(r) {
            Cell::Symbol { vcell, .. } if *vcell == val => Some(&**name),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_the_same_cell() {
        let mut heap = Heap::new();
        let a = heap.intern("foo");
        let b = heap.intern("foo");
        let c = heap.intern("bar");
        assert!(heap.is_symbol(a));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.symbol_name(a), "foo");
    }

    #[test]
    fn define_sets_the_value_cell() {
        let mut heap = Heap::new();
        let sym = heap.intern("x");
        assert_eq!(heap.symbol_value(sym), Value::Unbound);
        heap.define("x", Value::Int(9));
        assert_eq!(heap.symbol_value(sym), Value::Int(9));
    }

    #[test]
    fn bound_name_lookup_is_by_identity() {
        let mut heap = Heap::new();
        let target = heap.string("payload");
        let other = heap.string("payload");
        heap.define("target", target);
        assert_eq!(heap.symbol_bound_to(target), Some("target"));
        assert_eq!(heap.symbol_bound_to(other), None);
        assert_eq!(heap.symbol_bound_to(Value::Unbound), None);
    }
}
