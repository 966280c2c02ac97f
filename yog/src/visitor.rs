use crate::objects::{HeapObject, ObjectBody};
use crate::value::Value;

/// Calls `visitor` once for every outgoing reference of `object`.
///
/// The visitor may rewrite the slot in place. Immediates are passed too;
/// filtering is the visitor's business. Visited-state lives in the
/// collector, not here, so self references are fine.
pub fn trace_object(object: &mut HeapObject, visitor: &mut dyn FnMut(&mut Value)) {
    visitor(object.header.klass_mut());
    trace_body(&mut object.body, visitor);
}

/// Same as [`trace_object`] minus the header.
///
/// Also used on a body that is about to be allocated, so that its fields
/// count as roots while the allocator collects.
pub fn trace_body(body: &mut ObjectBody, visitor: &mut dyn FnMut(&mut Value)) {
    match body {
        ObjectBody::Object(instance) => visitor(&mut instance.attrs),
        ObjectBody::Class(class) => {
            visitor(&mut class.name);
            visitor(&mut class.superclass);
            visitor(&mut class.methods);
        }
        ObjectBody::Array(array) => {
            for item in array.items_mut() {
                visitor(item);
            }
        }
        // Chain links are slab ids and carry no heap references.
        ObjectBody::Table(table) => {
            for entry in table.entries_mut() {
                visitor(&mut entry.key);
                visitor(&mut entry.record);
            }
        }
        ObjectBody::TableIterator(iter) => visitor(&mut iter.table),
        ObjectBody::Exception(exc) => {
            visitor(&mut exc.message);
            visitor(&mut exc.stack_trace);
            visitor(&mut exc.context);
            visitor(&mut exc.attrs);
        }
        ObjectBody::Str(_) | ObjectBody::BigNum(_) | ObjectBody::Float(_) | ObjectBody::Native(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::header::{Header, ObjectId};
    use crate::objects::{Array, Class, Exception, Table};
    use crate::strategy::SymbolKeys;

    fn object(body: ObjectBody) -> HeapObject {
        HeapObject {
            header: Header::new(body.object_type(), Value::from_i64(99), ObjectId { upper: 0, lower: 0 }),
            body,
        }
    }

    fn collect_edges(object: &mut HeapObject) -> Vec<Value> {
        let mut edges = Vec::new();
        trace_object(object, &mut |v| edges.push(*v));
        edges
    }

    #[test]
    fn table_entries_yield_key_and_value() {
        let mut table = Table::new(Rc::new(SymbolKeys), 0);
        table.prepend(1, Value::from_i64(1), Value::from_i64(10));
        table.prepend(2, Value::from_i64(2), Value::from_i64(20));
        let mut obj = object(ObjectBody::Table(table));

        let edges = collect_edges(&mut obj);
        assert_eq!(edges[0], Value::from_i64(99), "klass first");
        assert_eq!(edges.len(), 5);
        for v in [1, 10, 2, 20] {
            assert!(edges.contains(&Value::from_i64(v)));
        }
    }

    #[test]
    fn visitor_can_rewrite_fields_in_place() {
        let mut obj = object(ObjectBody::Array(Array::from_vec(vec![
            Value::from_i64(1),
            Value::from_i64(2),
        ])));
        trace_object(&mut obj, &mut |v| {
            if let Some(n) = v.as_fixnum() {
                *v = Value::from_i64(n * 10);
            }
        });
        let ObjectBody::Array(array) = &obj.body else {
            panic!("array body expected");
        };
        assert_eq!(array.items(), &[Value::from_i64(10), Value::from_i64(20)]);
        assert_eq!(obj.header.klass(), Value::from_i64(990));
    }

    #[test]
    fn class_and_exception_fields_are_all_visited() {
        let mut class = object(ObjectBody::Class(Class::default()));
        assert_eq!(collect_edges(&mut class).len(), 4);

        let mut exc = object(ObjectBody::Exception(Exception::default()));
        assert_eq!(collect_edges(&mut exc).len(), 5);
    }
}
