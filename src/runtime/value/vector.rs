use crate::runtime::heap::{Cell, Heap};

use super::Value;

impl Heap {
    pub fn vector(&mut self, items: Vec<Value>) -> Value {
        self.alloc_value(Cell::Vector(items))
    }

    pub fn is_vector(&self, v: Value) -> bool {
        matches!(v, Value::Obj(r) if matches!(self.cell(r), Cell::Vector(_)))
    }

    pub fn vector_items(&self, v: Value) -> &[Value] {
        let Value::Obj(r) = v else {
            panic!("vector accessor on a non-vector")
        };
        match self.cell(r) {
            Cell::Vector(items) => items,
            _ => panic!("vector accessor on a non-vector"),
        }
    }

    pub fn vector_len(&self, v: Value) -> usize {
        self.vector_items(v).len()
    }

    pub fn vector_ref(&self, v: Value, index: usize) -> Value {
        self.vector_items(v)[index]
    }

    pub fn vector_set(&mut self, v: Value, index: usize, item: Value) {
        let Some(r) = v.obj() else {
            panic!("vector mutator on a non-vector")
        };
        match self.cell_mut(r) {
            Cell::Vector(items) => items[index] = item,
            _ => panic!("vector mutator on a non-vector"),
        }
    }
}
