use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

// Oldest history entries are dropped past this; back-navigation is best-effort
const MAX_HISTORY: usize = 512;

/// Anything that can list the playable track names right now
pub trait TrackSource: Send {
    fn list_tracks(&self) -> Vec<String>;
}

/// Shuffled, history-tracked track order
pub struct Sequencer<S> {
    source: S,
    order: Vec<String>,
    index: Option<usize>,
    history: Vec<usize>,
    rng: StdRng,
}

impl<S: TrackSource> Sequencer<S> {
    pub fn new(source: S) -> Self {
        Self::with_rng(source, StdRng::from_entropy())
    }

    /// Deterministic shuffles, for reproducible runs
    pub fn with_seed(source: S, seed: u64) -> Self {
        Self::with_rng(source, StdRng::seed_from_u64(seed))
    }

    fn with_rng(source: S, rng: StdRng) -> Self {
        Self {
            source,
            order: Vec::new(),
            index: None,
            history: Vec::new(),
            rng,
        }
    }

    /// Advance to the next track, reshuffling when the order runs out.
    /// `None` when the source has nothing to play.
    pub fn next(&mut self) -> Option<String> {
        if self.order.is_empty() {
            self.rebuild();
            if self.order.is_empty() {
                return None;
            }
        }

        let mut next = self.index.map_or(0, |index| index + 1);
        if next >= self.order.len() {
            self.order.shuffle(&mut self.rng);
            info!("Reached end of playlist, reshuffled {} tracks", self.order.len());
            next = 0;
        }

        self.index = Some(next);
        self.history.push(next);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.current().map(str::to_string)
    }

    /// Step back to the track played before the current one, or replay the
    /// current one when there is nothing earlier
    pub fn previous(&mut self) -> Option<String> {
        if self.index.is_none() {
            return self.next();
        }

        if self.history.len() > 1 {
            self.history.pop();
            self.index = self.history.last().copied();
        }
        self.current().map(str::to_string)
    }

    /// What `next()` will return, when that is already known. `None` at the
    /// end of a pass, since the reshuffle hasn't happened yet.
    pub fn peek_next(&self) -> Option<&str> {
        let next = self.index.map_or(0, |index| index + 1);
        self.order.get(next).map(String::as_str)
    }

    pub fn current(&self) -> Option<&str> {
        self.index
            .and_then(|index| self.order.get(index))
            .map(String::as_str)
    }

    /// Forget the current order so the next call re-lists the source
    pub fn invalidate(&mut self) {
        self.order.clear();
        self.index = None;
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn rebuild(&mut self) {
        let mut names = self.source.list_tracks();
        names.sort();
        names.dedup();
        names.shuffle(&mut self.rng);
        debug!("Built shuffled order of {} tracks", names.len());

        self.order = names;
        self.index = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSource;
    use rand::Rng;
    use std::collections::HashSet;

    fn with_order(names: &[&str]) -> Sequencer<StaticSource> {
        let mut sequencer = Sequencer::with_seed(StaticSource::new(names), 7);
        sequencer.order = names.iter().map(|n| n.to_string()).collect();
        sequencer
    }

    #[test]
    fn test_next_prev_scenario() {
        let mut sequencer = with_order(&["b.wav", "a.wav", "c.wav"]);

        assert_eq!(sequencer.next().as_deref(), Some("b.wav"));
        assert_eq!(sequencer.history, vec![0]);
        assert_eq!(sequencer.next().as_deref(), Some("a.wav"));
        assert_eq!(sequencer.history, vec![0, 1]);
        assert_eq!(sequencer.previous().as_deref(), Some("b.wav"));
        assert_eq!(sequencer.history, vec![0]);
        assert_eq!(sequencer.next().as_deref(), Some("a.wav"));
        assert_eq!(sequencer.history, vec![0, 1]);
    }

    #[test]
    fn test_peek_matches_next_within_a_pass() {
        let mut sequencer = with_order(&["b.wav", "a.wav", "c.wav"]);
        assert_eq!(sequencer.peek_next(), Some("b.wav"));
        sequencer.next();
        assert_eq!(sequencer.peek_next(), Some("a.wav"));
        assert_eq!(sequencer.next().as_deref(), Some("a.wav"));
        sequencer.next();
        // the next pass hasn't been shuffled yet
        assert_eq!(sequencer.peek_next(), None);
    }

    #[test]
    fn test_previous_at_start_replays_current() {
        let mut sequencer = with_order(&["b.wav", "a.wav", "c.wav"]);
        sequencer.next();
        assert_eq!(sequencer.previous().as_deref(), Some("b.wav"));
        assert_eq!(sequencer.previous().as_deref(), Some("b.wav"));
        assert_eq!(sequencer.history, vec![0]);
    }

    #[test]
    fn test_previous_before_anything_played_starts_playlist() {
        let mut sequencer = with_order(&["b.wav", "a.wav"]);
        assert_eq!(sequencer.previous().as_deref(), Some("b.wav"));
    }

    #[test]
    fn test_no_repeats_within_one_pass() {
        let names = ["1", "2", "3", "4", "5", "6", "7", "8"];
        let mut sequencer = Sequencer::with_seed(StaticSource::new(&names), 42);

        for _ in 0..3 {
            let pass: HashSet<String> = (0..names.len()).filter_map(|_| sequencer.next()).collect();
            assert_eq!(pass.len(), names.len());
        }
    }

    #[test]
    fn test_empty_source_yields_no_track() {
        let source = StaticSource::new(&[]);
        let mut sequencer = Sequencer::with_seed(source.clone(), 1);
        assert_eq!(sequencer.next(), None);
        assert_eq!(sequencer.previous(), None);

        // files show up later - the next call picks them up
        source.set(&["late.wav"]);
        assert_eq!(sequencer.next().as_deref(), Some("late.wav"));
    }

    #[test]
    fn test_duplicates_are_listed_once() {
        let mut sequencer = Sequencer::with_seed(StaticSource::new(&["a", "a", "b"]), 3);
        sequencer.next();
        assert_eq!(sequencer.len(), 2);
    }

    #[test]
    fn test_index_stays_in_bounds_under_random_navigation() {
        let mut ops = StdRng::seed_from_u64(99);
        for seed in 0..20 {
            let names = ["a", "b", "c", "d", "e"];
            let mut sequencer = Sequencer::with_seed(StaticSource::new(&names), seed);

            for _ in 0..500 {
                if ops.gen_bool(0.6) {
                    let before = sequencer.current().map(str::to_string);
                    let played = sequencer.next();
                    assert!(played.is_some());
                    // one step back lands on what was playing before, as long
                    // as the step didn't cross a reshuffle
                    if sequencer.index != Some(0) && before.is_some() {
                        assert_eq!(sequencer.previous(), before);
                        sequencer.next();
                    }
                } else {
                    sequencer.previous();
                }

                let index = sequencer.index.unwrap();
                assert!(index < sequencer.len());
                assert!(sequencer.history.iter().all(|&i| i < sequencer.len()));
                assert_eq!(sequencer.history.last().copied(), Some(index));
            }
        }
    }

    #[test]
    fn test_history_is_capped() {
        let mut sequencer = Sequencer::with_seed(StaticSource::new(&["a", "b", "c"]), 5);
        for _ in 0..MAX_HISTORY + 50 {
            sequencer.next();
        }
        assert_eq!(sequencer.history.len(), MAX_HISTORY);
    }
}
