#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stategraph_view::{ChildFactory, KeyGenerator, KeyedList, ReconcileOptions};

#[derive(Debug, Arbitrary)]
struct Input {
    recycle: bool,
    rounds: Vec<Vec<u8>>,
}

#[derive(Default)]
struct Counting {
    live: usize,
}

impl ChildFactory<u8> for Counting {
    type Node = u8;

    fn create(&mut self, item: &u8, _index: usize) -> u8 {
        self.live += 1;
        *item
    }

    fn update(&mut self, node: &mut u8, item: &u8, _index: usize) {
        *node = *item;
    }

    fn unmount(&mut self, _node: u8) {
        self.live -= 1;
    }
}

fuzz_target!(|input: Input| {
    let keys = KeyGenerator::by_item(|item: &u8| item.to_string(), false);
    let mut list = KeyedList::new(ReconcileOptions {
        recycle: input.recycle,
    });
    let mut factory = Counting::default();

    for items in input.rounds.iter().take(64) {
        let Ok(report) = list.reconcile(items, &keys, &mut factory) else {
            return;
        };
        assert_eq!(list.len(), items.len());
        assert_eq!(factory.live, items.len());
        assert!(list.nodes().copied().eq(items.iter().copied()));
        assert_eq!(
            report.created.len() + report.reused + report.recycled,
            items.len()
        );
        assert!(report.duplicates.windows(2).all(|pair| pair[0] < pair[1]));
    }

    list.clear(&mut factory);
    assert_eq!(factory.live, 0);
});
