#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stategraph_core::{
    FnSubscriber, Observed, ObservedProperty, Roles, StateContext, Subscriber, TrackedProperty,
};

#[derive(Debug, Arbitrary)]
enum Op {
    Push(i16),
    Pop,
    Shift,
    Unshift(i16),
    Splice { start: u8, delete: u8, items: Vec<i16> },
    SetAt(u8, i16),
    Sort,
    Reverse,
    Truncate(u8),
    Clear,
}

fuzz_target!(|ops: Vec<Op>| {
    let ctx = StateContext::new();
    let list = Observed::new(Vec::<i16>::new());
    let cell = ObservedProperty::new(&ctx, list.clone(), None, "list");
    let hits = Rc::new(Cell::new(0_usize));
    let h = Rc::clone(&hits);
    let sub = FnSubscriber::new(&ctx, Roles::VALUE_CHANGED, move |_| h.set(h.get() + 1));
    cell.subscribe_me(sub.id());

    let mut model: Vec<i16> = Vec::new();
    for op in ops.into_iter().take(256) {
        let before = hits.get();
        let notified = match op {
            Op::Push(value) => {
                list.push(value);
                model.push(value);
                Some(true)
            }
            Op::Pop => {
                let popped = list.pop();
                assert_eq!(popped, model.pop());
                Some(popped.is_some())
            }
            Op::Shift => {
                let shifted = list.shift();
                let expected = (!model.is_empty()).then(|| model.remove(0));
                assert_eq!(shifted, expected);
                Some(shifted.is_some())
            }
            Op::Unshift(value) => {
                list.unshift(value);
                model.insert(0, value);
                Some(true)
            }
            Op::Splice { start, delete, items } => {
                let start = usize::from(start).min(model.len());
                let end = (start + usize::from(delete)).min(model.len());
                let expected: Vec<i16> = model.splice(start..end, items.iter().copied()).collect();
                let removed = list.splice(start, usize::from(delete), items).into_removed();
                assert_eq!(removed, expected);
                None
            }
            Op::SetAt(index, value) => {
                let index = usize::from(index);
                if index < model.len() {
                    model[index] = value;
                }
                let _ = list.set_at(index, value);
                None
            }
            Op::Sort => {
                list.sort();
                model.sort();
                None
            }
            Op::Reverse => {
                list.reverse();
                model.reverse();
                None
            }
            Op::Truncate(len) => {
                list.truncate(usize::from(len));
                model.truncate(usize::from(len));
                None
            }
            Op::Clear => {
                list.clear();
                model.clear();
                None
            }
        };
        if let Some(changed) = notified {
            assert_eq!(hits.get(), before + usize::from(changed));
        }
        assert_eq!(list.get_raw(), model);
    }
    assert_eq!(list.get_raw(), model);
});
