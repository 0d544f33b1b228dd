//! Lightweight named timers used to report where solve time is spent.

use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct NamedTimer {
    name: &'static str,
    elapsed: Duration,
    start: Option<Instant>,
}

/// A flat collection of named accumulating timers.
#[derive(Debug, Default)]
pub struct Timers {
    timers: Vec<NamedTimer>,
}

impl Timers {
    pub fn reset(&mut self) {
        self.timers.clear();
    }

    pub fn start(&mut self, name: &'static str) {
        let t = self.entry(name);
        t.start = Some(Instant::now());
    }

    pub fn stop(&mut self, name: &'static str) {
        let t = self.entry(name);
        if let Some(start) = t.start.take() {
            t.elapsed += start.elapsed();
        }
    }

    pub fn elapsed(&self, name: &str) -> Duration {
        self.timers
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.elapsed)
            .unwrap_or_default()
    }

    /// Timer names and totals in first-started order.
    pub fn totals(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.timers.iter().map(|t| (t.name, t.elapsed))
    }

    fn entry(&mut self, name: &'static str) -> &mut NamedTimer {
        if let Some(idx) = self.timers.iter().position(|t| t.name == name) {
            &mut self.timers[idx]
        } else {
            self.timers.push(NamedTimer {
                name,
                ..Default::default()
            });
            self.timers.last_mut().unwrap()
        }
    }
}

/// Time a block of code against a named timer.
#[macro_export]
macro_rules! timeit {
    ($timers:expr => $name:literal; $body:block) => {{
        $timers.start($name);
        let out = $body;
        $timers.stop($name);
        out
    }};
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_accumulates() {
        let mut timers = Timers::default();
        timeit! {timers => "outer"; {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }};
        timeit! {timers => "outer"; {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }};
        assert!(timers.elapsed("outer") >= Duration::from_millis(2));
        assert_eq!(timers.elapsed("missing"), Duration::ZERO);
    }
}
