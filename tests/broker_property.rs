#[macro_use]
extern crate proptest;

use proptest::prelude::{Strategy, prop};

use stageflow::broker::{EventBroker, EventDraft};

fn stage_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z_]{0,20}").unwrap()
}

proptest! {
    /// Sequence numbers are dense and strictly increasing from 0 regardless
    /// of buffer capacity or payload mix.
    #[test]
    fn prop_sequences_strictly_increase(
        capacity in 1usize..32,
        stages in prop::collection::vec(stage_name_strategy(), 1..64),
    ) {
        let broker = EventBroker::new(capacity, 8);
        for (i, stage) in stages.iter().enumerate() {
            let event = broker.publish(EventDraft::output(stage.clone(), format!("out {i}")));
            prop_assert_eq!(event.sequence, i as u64);
        }

        let history = broker.history(None);
        prop_assert!(history.len() <= capacity);
        prop_assert!(history.windows(2).all(|pair| pair[0].sequence + 1 == pair[1].sequence));

        // The ring retains exactly the newest events.
        if let Some(last) = history.last() {
            prop_assert_eq!(last.sequence, stages.len() as u64 - 1);
        }
    }

    /// Replay with any cursor returns exactly the buffered events after it.
    #[test]
    fn prop_history_since_matches_filter(
        capacity in 1usize..32,
        total in 1usize..64,
        since in 0u64..64,
    ) {
        let broker = EventBroker::new(capacity, 8);
        for i in 0..total {
            broker.publish(EventDraft::output("market_analyst_agent", format!("out {i}")));
        }

        let full = broker.history(None);
        let expected: Vec<u64> = full
            .iter()
            .map(|event| event.sequence)
            .filter(|sequence| *sequence > since)
            .collect();
        let got: Vec<u64> = broker
            .history(Some(since))
            .iter()
            .map(|event| event.sequence)
            .collect();
        prop_assert_eq!(got, expected);
    }
}
