//! Control task and operator inputs.
//!
//! The control task polls an [`OperatorPanel`] once per control period:
//!
//! | input               | effect                                          |
//! |---------------------|-------------------------------------------------|
//! | [`Keys::EXIT`]      | clear the run flag                              |
//! | [`Keys::INCREASE`]  | raise the overload by one step, log the value   |
//! | [`Keys::DECREASE`]  | lower the overload by one step, log the value   |
//! | [`Keys::RESERVED`]  | nothing                                         |
//! | [`Switches::LOAD`]  | burn `overload% x base_period` every period     |
//!
//! Keys are momentary: a panel reports each press once. Switches are levels;
//! their transitions are detected here against the previous poll so that
//! `CPU overload: ON/OFF` is logged once per flip.

pub mod console;

pub use console::ConsolePanel;

use crate::config::{ControlConfig, LoadConfig};
use crate::load::{CpuBurner, OverloadSetting};
use crate::run_control::RunControl;
use bitflags::bitflags;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

bitflags! {
    /// Momentary push buttons.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Keys: u8 {
        /// Request application exit
        const EXIT     = 0b0001;
        /// Not bound to any action
        const RESERVED = 0b0010;
        /// Increase the CPU overload
        const INCREASE = 0b0100;
        /// Decrease the CPU overload
        const DECREASE = 0b1000;
    }
}

bitflags! {
    /// Toggle switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Switches: u8 {
        /// Synthetic CPU load enabled
        const LOAD = 0b0001;
    }
}

/// Source of operator inputs.
pub trait OperatorPanel: Send {
    /// Keys pressed since the previous call.
    fn read_keys(&mut self) -> Keys;

    /// Current switch positions.
    fn read_switches(&mut self) -> Switches;
}

/// Counters returned when the control task exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlReport {
    /// Control periods executed
    pub polls: u64,
    /// Periods in which CPU load was burnt
    pub loaded_periods: u64,
    /// Total CPU time requested from the burner
    pub burnt: Duration,
    /// Overload percentage at exit
    pub overload: u32,
}

/// Periodic task reacting to operator inputs and generating CPU load.
pub struct ControlTask {
    panel: Box<dyn OperatorPanel>,
    burner: Arc<dyn CpuBurner>,
    overload: OverloadSetting,
    load_enabled: bool,
    period: Duration,
    previous_switches: Switches,
    run: RunControl,
}

impl ControlTask {
    /// Control task over `panel`. The switch positions at construction are the
    /// reference for the first edge detection.
    pub fn new(
        mut panel: Box<dyn OperatorPanel>,
        burner: Arc<dyn CpuBurner>,
        control: &ControlConfig,
        load: &LoadConfig,
        run: RunControl,
    ) -> Self {
        let previous_switches = panel.read_switches();
        Self {
            panel,
            burner,
            overload: OverloadSetting::from_config(load),
            load_enabled: load.enabled,
            period: control.period,
            previous_switches,
            run,
        }
    }

    /// Current overload setting.
    pub fn overload(&self) -> &OverloadSetting {
        &self.overload
    }

    /// Handle one poll of the panel. Returns the CPU time to burn this period.
    pub fn poll(&mut self) -> Option<Duration> {
        let keys = self.panel.read_keys();
        let switches = self.panel.read_switches();

        if keys.contains(Keys::EXIT) && self.run.request_stop() {
            info!("Exit requested by operator");
        }
        if keys.contains(Keys::INCREASE) {
            self.overload.increase();
            info!("Overload value = {}", self.overload.value());
        }
        if keys.contains(Keys::DECREASE) {
            self.overload.decrease();
            info!("Overload value = {}", self.overload.value());
        }

        let flipped = (switches ^ self.previous_switches).contains(Switches::LOAD);
        self.previous_switches = switches;
        let loaded = switches.contains(Switches::LOAD);
        if flipped {
            info!("CPU overload: {}", if loaded { "ON" } else { "OFF" });
        }

        (loaded && self.load_enabled).then(|| self.overload.burn_duration())
    }

    /// Run until the run flag is cleared.
    ///
    /// Burning happens on the task's own thread and does not yield: on a
    /// single-worker runtime it delays every other task by the burn time.
    pub async fn run(mut self) -> ControlReport {
        let mut report = ControlReport::default();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        // work first, then wait: a stop seen at the release point ends the task
        while self.run.is_running() {
            report.polls += 1;

            if let Some(burn) = self.poll() {
                self.burner.burn(burn);
                report.loaded_periods += 1;
                report.burnt += burn;
            }

            ticker.tick().await;
        }

        report.overload = self.overload.value();
        info!(
            polls = report.polls,
            loaded_periods = report.loaded_periods,
            overload = report.overload,
            "Terminating control task"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Plays back one (keys, switches) pair per poll, then idles.
    struct Script {
        steps: VecDeque<(Keys, Switches)>,
        switches: Switches,
    }

    impl Script {
        fn new(steps: &[(Keys, Switches)]) -> Self {
            Self {
                steps: steps.iter().copied().collect(),
                switches: Switches::empty(),
            }
        }
    }

    impl OperatorPanel for Script {
        fn read_keys(&mut self) -> Keys {
            match self.steps.pop_front() {
                Some((keys, switches)) => {
                    self.switches = switches;
                    keys
                }
                None => Keys::empty(),
            }
        }

        fn read_switches(&mut self) -> Switches {
            self.switches
        }
    }

    struct NoBurn;

    impl CpuBurner for NoBurn {
        fn burn(&self, _duration: Duration) {}
    }

    fn task(steps: &[(Keys, Switches)], load: LoadConfig) -> (ControlTask, RunControl) {
        let run = RunControl::new();
        let task = ControlTask::new(
            Box::new(Script::new(steps)),
            Arc::new(NoBurn),
            &ControlConfig::default(),
            &load,
            run.clone(),
        );
        (task, run)
    }

    #[test]
    fn exit_key_clears_run_flag() {
        let (mut task, run) = task(&[(Keys::EXIT, Switches::empty())], LoadConfig::default());
        assert!(task.poll().is_none());
        assert!(!run.is_running());
    }

    #[test]
    fn overload_keys_follow_clamps() {
        let up = (Keys::INCREASE, Switches::empty());
        let (mut task, _run) = task(&[up; 10], LoadConfig::default());
        for _ in 0..10 {
            task.poll();
        }
        assert_eq!(task.overload().value(), 90);
    }

    #[test]
    fn load_switch_burns_scaled_period() {
        let steps = [
            (Keys::empty(), Switches::LOAD),
            (Keys::INCREASE, Switches::LOAD),
            (Keys::empty(), Switches::empty()),
        ];
        let (mut task, _run) = task(&steps, LoadConfig::default());

        assert_eq!(task.poll(), Some(Duration::from_millis(20)));
        assert_eq!(task.poll(), Some(Duration::from_millis(30)));
        assert_eq!(task.poll(), None);
    }

    #[test]
    fn disabled_load_never_burns() {
        let load = LoadConfig {
            enabled: false,
            ..LoadConfig::default()
        };
        let (mut task, _run) = task(&[(Keys::empty(), Switches::LOAD)], load);
        assert_eq!(task.poll(), None);
    }

    #[test]
    fn reserved_key_does_nothing() {
        let (mut task, run) = task(&[(Keys::RESERVED, Switches::empty())], LoadConfig::default());
        assert_eq!(task.poll(), None);
        assert!(run.is_running());
        assert_eq!(task.overload().value(), 20);
    }

    /// Remembers whether the run flag was still set at each burn.
    struct FlagAtBurn {
        run: RunControl,
        burns: Arc<parking_lot::Mutex<Vec<bool>>>,
    }

    impl CpuBurner for FlagAtBurn {
        fn burn(&self, _duration: Duration) {
            self.burns.lock().push(self.run.is_running());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_burn_after_external_stop() {
        let run = RunControl::new();
        let burns = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let task = ControlTask::new(
            Box::new(Script::new(&[(Keys::empty(), Switches::LOAD)])),
            Arc::new(FlagAtBurn {
                run: run.clone(),
                burns: burns.clone(),
            }),
            &ControlConfig::default(),
            &LoadConfig::default(),
            run.clone(),
        );
        let task = tokio::spawn(task.run());

        // stop lands while the task waits for its 300 ms release point
        tokio::time::sleep(Duration::from_millis(250)).await;
        run.request_stop();

        let report = task.await.unwrap();
        assert_eq!(report.polls, 3);
        assert_eq!(*burns.lock(), vec![true; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_exit_key() {
        let steps = [
            (Keys::empty(), Switches::LOAD),
            (Keys::DECREASE, Switches::LOAD),
            (Keys::EXIT, Switches::LOAD),
        ];
        let (task, run) = task(&steps, LoadConfig::default());

        let report = task.run().await;
        assert!(!run.is_running());
        assert_eq!(report.polls, 3);
        assert_eq!(report.loaded_periods, 3);
        assert_eq!(report.overload, 10);
        assert_eq!(report.burnt, Duration::from_millis(20 + 10 + 10));
    }
}
