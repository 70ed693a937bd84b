use crate::runtime::heap::{Cell, Heap, ObjRef};

use super::Value;

impl Heap {
    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        self.alloc_value(Cell::Pair { car, cdr })
    }

    /// Builds a proper list from the slice.
    pub fn list(&mut self, items: &[Value]) -> Value {
        let mut ls = Value::Nil;
        for &item in items.iter().rev() {
            ls = self.cons(item, ls);
        }
        ls
    }

    pub fn is_pair(&self, v: Value) -> bool {
        self.pair_ref(v).is_some()
    }

    pub(crate) fn pair_ref(&self, v: Value) -> Option<ObjRef> {
        match v {
            Value::Obj(r) => matches!(self.cell(r), Cell::Pair { .. }).then_some(r),
            _ => None,
        }
    }

    pub(crate) fn pair_parts(&self, r: ObjRef) -> (Value, Value) {
        match self.cell(r) {
            Cell::Pair { car, cdr } => (*car, *cdr),
            _ => panic!("pair accessor on a non-pair cell"),
        }
    }

    pub fn car(&self, v: Value) -> Value {
        let r = self.pair_ref(v).expect("car of a non-pair");
        self.pair_parts(r).0
    }

    pub fn cdr(&self, v: Value) -> Value {
        let r = self.pair_ref(v).expect("cdr of a non-pair");
        self.pair_parts(r).1
    }

    pub fn set_car(&mut self, v: Value, new: Value) {
        let r = self.pair_ref(v).expect("set-car! of a non-pair");
        let Cell::Pair { car, .. } = self.cell_mut(r) else {
            unreachable!()
        };
        *car = new;
    }

    pub fn set_cdr(&mut self, v: Value, new: Value) {
        let r = self.pair_ref(v).expect("set-cdr! of a non-pair");
        let Cell::Pair { cdr, .. } = self.cell_mut(r) else {
            unreachable!()
        };
        *cdr = new;
    }
}
