/// Scan-cycle controller: the event pipeline between the radio and the log.
///
/// States run `Idle → Scanning → Draining → Scanning …`. Each
/// `ScanEvent::Advertisement` is taken to completion (filter, classify,
/// query GPS, signal, maybe persist, stamp liveness) before the next event
/// is looked at; the caller feeds events from a single context. On
/// `ScanEvent::CycleComplete` the controller drains the radio's buffered
/// results, ages the registry, logs a summary and arms the next window at
/// once, with no idle gap.
///
/// A scan window that fails to start is logged and left alone. Recovery
/// belongs to the liveness monitor, which restarts the process.
use crate::error::ScanError;
use crate::filter::{filter_advertisement, ExposurePayload};
use crate::gps::{PositionSample, PositionTimeProvider, TimeSample};
use crate::indicator::{Classification, StatusIndicator};
use crate::liveness::LivenessMonitor;
use crate::logbook::{LogSink, LogWriter};
use crate::registry::{Seen, SightingRegistry};
use crate::scanner::{Advertisement, ScanConfig, ScanEngine, ScanEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Scanning,
    Draining,
}

/// A fully processed sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub payload: ExposurePayload,
    pub position: Option<PositionSample>,
    pub time: Option<TimeSample>,
    pub class: Classification,
    /// Whether a log record was appended.
    pub persisted: bool,
}

pub struct ScanCycleController<'a, E, P, S, I> {
    config: ScanConfig,
    engine: E,
    provider: P,
    writer: LogWriter<S>,
    indicator: I,
    liveness: &'a LivenessMonitor,
    registry: SightingRegistry,
    state: CycleState,
    cycle_sightings: u32,
    cycles: u32,
}

impl<'a, E, P, S, I> ScanCycleController<'a, E, P, S, I>
where
    E: ScanEngine,
    P: PositionTimeProvider,
    S: LogSink,
    I: StatusIndicator,
{
    pub fn new(
        config: ScanConfig,
        engine: E,
        provider: P,
        sink: S,
        indicator: I,
        liveness: &'a LivenessMonitor,
    ) -> Self {
        Self {
            config,
            engine,
            provider,
            writer: LogWriter::new(sink),
            indicator,
            liveness,
            registry: SightingRegistry::new(),
            state: CycleState::Idle,
            cycle_sightings: 0,
            cycles: 0,
        }
    }

    /// Arm the first scan window.
    pub fn start(&mut self) -> Result<(), ScanError> {
        self.arm()
    }

    /// Handle one event from the scan engine. Returns the sighting if the
    /// event was a qualifying advertisement.
    pub fn handle(&mut self, event: ScanEvent, now_ms: u32) -> Option<Sighting> {
        match event {
            ScanEvent::Advertisement(adv) => self.process_advertisement(&adv, now_ms),
            ScanEvent::CycleComplete { heard } => {
                self.complete_cycle(heard, now_ms);
                None
            }
        }
    }

    /// Run one advertisement through the pipeline.
    pub fn process_advertisement(&mut self, adv: &Advertisement, now_ms: u32) -> Option<Sighting> {
        let payload = filter_advertisement(adv)?;

        let seen = self.registry.classify(&payload.addr, now_ms);
        let position = self.provider.current_position().filter(|p| p.valid);
        let time = self.provider.current_time(now_ms);

        let class = match (seen, position.is_some()) {
            (Seen::New, _) => Classification::New,
            (Seen::Repeat, true) => Classification::RepeatWithPosition,
            (Seen::Repeat, false) => Classification::RepeatWithoutPosition,
        };
        if seen == Seen::New {
            log::debug!("+   {} RSSI: {:?}", payload.addr, payload.rssi);
        }
        self.indicator.signal(class);

        let mut persisted = false;
        if let Some(t) = time.filter(|t| t.is_fresh(self.config.time_freshness_ms)) {
            match self.writer.write(&payload, &t, position.as_ref()) {
                Ok(line) => {
                    persisted = true;
                    if let Ok(s) = core::str::from_utf8(&line) {
                        log::info!("{}", s.trim_end());
                    }
                }
                Err(e) => log::error!("Dropped record for {}: {}", payload.addr, e),
            }
        }

        self.liveness.record_success(now_ms);
        self.cycle_sightings += 1;

        Some(Sighting {
            payload,
            position,
            time,
            class,
            persisted,
        })
    }

    fn complete_cycle(&mut self, heard: u32, now_ms: u32) {
        self.state = CycleState::Draining;
        self.cycles += 1;

        self.engine.clear_results();
        let evicted = self.registry.sweep(now_ms, self.config.forget_after_ms);
        log::info!(
            "Scan complete: {} advertisements, {} sightings, {} tracked ({} forgotten)",
            heard,
            self.cycle_sightings,
            self.registry.size(),
            evicted,
        );
        self.cycle_sightings = 0;

        if let Err(e) = self.arm() {
            log::error!("Scan restart failed: {}", e);
        }
    }

    fn arm(&mut self) -> Result<(), ScanError> {
        match self.engine.start(self.config.window_ms) {
            Ok(()) => {
                self.state = CycleState::Scanning;
                Ok(())
            }
            Err(e) => {
                self.state = CycleState::Idle;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn registry(&self) -> &SightingRegistry {
        &self.registry
    }

    pub fn writer(&self) -> &LogWriter<S> {
        &self.writer
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Completed scan windows since boot.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::defaults::EN_SERVICE_UUID_16;
    use crate::liveness::Liveness;
    use crate::logbook::tests::MemorySink;
    use crate::scanner::MAX_ADV_LEN;

    #[derive(Default)]
    struct FakeEngine {
        windows: Vec<u32>,
        clears: u32,
        fail: bool,
    }

    impl ScanEngine for FakeEngine {
        fn start(&mut self, window_ms: u32) -> Result<(), ScanError> {
            if self.fail {
                return Err(ScanError::Start("controller busy".into()));
            }
            self.windows.push(window_ms);
            Ok(())
        }

        fn clear_results(&mut self) {
            self.clears += 1;
        }
    }

    #[derive(Default)]
    struct FakeGps {
        position: Cell<Option<PositionSample>>,
        time: Cell<Option<TimeSample>>,
    }

    impl PositionTimeProvider for FakeGps {
        fn current_position(&self) -> Option<PositionSample> {
            self.position.get()
        }

        fn current_time(&self, _now_ms: u32) -> Option<TimeSample> {
            self.time.get()
        }
    }

    #[derive(Default)]
    struct RecordingLed {
        pulses: Vec<Classification>,
    }

    impl StatusIndicator for RecordingLed {
        fn signal(&mut self, class: Classification) {
            self.pulses.push(class);
        }
    }

    type Controller<'a> = ScanCycleController<'a, FakeEngine, &'a FakeGps, MemorySink, RecordingLed>;

    fn controller<'a>(gps: &'a FakeGps, liveness: &'a LivenessMonitor) -> Controller<'a> {
        ScanCycleController::new(
            ScanConfig::new(),
            FakeEngine::default(),
            gps,
            MemorySink::default(),
            RecordingLed::default(),
            liveness,
        )
    }

    fn en_adv(last: u8, payload_len: usize) -> Advertisement {
        Advertisement {
            addr: [0x6E, 0x20, 0x31, 0x42, 0x53, last],
            rssi: Some(-64),
            service_uuids_16: heapless::Vec::from_slice(&[EN_SERVICE_UUID_16]).unwrap(),
            service_data_uuid: EN_SERVICE_UUID_16,
            service_data: (0..payload_len as u8).collect::<heapless::Vec<u8, MAX_ADV_LEN>>(),
        }
    }

    fn other_adv() -> Advertisement {
        Advertisement {
            addr: [0x11, 0x11, 0x11, 0x11, 0x11, 0x11],
            rssi: Some(-40),
            service_uuids_16: heapless::Vec::from_slice(&[0x180F]).unwrap(),
            service_data_uuid: 0x180F,
            service_data: heapless::Vec::from_slice(&[0x64]).unwrap(),
        }
    }

    fn time(valid: bool, age_ms: u32) -> TimeSample {
        TimeSample {
            year: 2026,
            month: 10,
            day: 17,
            hour: 21,
            minute: 4,
            second: 33,
            satellites: 6,
            valid,
            age_ms,
        }
    }

    fn fix() -> PositionSample {
        PositionSample {
            lat: 55.9533,
            lon: -3.1883,
            altitude_m: 47.0,
            speed_kmph: 32.5,
            hdop: 1.2,
            valid: true,
        }
    }

    // ── Cycle state machine ─────────────────────────────────────────

    #[test]
    fn start_arms_a_passive_window() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        assert_eq!(c.state(), CycleState::Idle);
        c.start().unwrap();
        assert_eq!(c.state(), CycleState::Scanning);
        assert_eq!(c.engine().windows, vec![10_000]);
    }

    #[test]
    fn cycle_complete_clears_sweeps_and_rearms() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        c.start().unwrap();

        c.handle(ScanEvent::Advertisement(en_adv(1, 20)), 0);
        c.handle(ScanEvent::Advertisement(en_adv(2, 20)), 1_000_000);
        // 21 minutes later the first address has aged out, the second not
        c.handle(ScanEvent::CycleComplete { heard: 7 }, 1_260_000);

        assert_eq!(c.engine().clears, 1);
        assert_eq!(c.engine().windows.len(), 2);
        assert_eq!(c.state(), CycleState::Scanning);
        assert_eq!(c.registry().size(), 1);
        assert_eq!(c.cycles(), 1);
    }

    #[test]
    fn failed_rearm_is_not_retried() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        c.start().unwrap();
        c.engine.fail = true;

        c.handle(ScanEvent::CycleComplete { heard: 0 }, 10_000);
        assert_eq!(c.state(), CycleState::Idle);
        assert_eq!(c.engine().windows.len(), 1);
        // Nothing arrives any more; the monitor takes over
        assert!(matches!(liveness.check(20_001), Liveness::Stalled { .. }));
    }

    #[test]
    fn failed_first_start_reports_error() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        c.engine.fail = true;
        assert!(matches!(c.start(), Err(ScanError::Start(_))));
        assert_eq!(c.state(), CycleState::Idle);
    }

    // ── Advertisement processing ────────────────────────────────────

    #[test]
    fn non_matching_advertisement_has_no_effect() {
        let gps = FakeGps::default();
        gps.time.set(Some(time(true, 0)));
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);

        assert!(c.handle(ScanEvent::Advertisement(other_adv()), 5_000).is_none());
        assert!(c.registry().is_empty());
        assert!(c.indicator().pulses.is_empty());
        assert!(c.writer().sink().appends.is_empty());
        assert_eq!(liveness.last_success_ms(), 0);
    }

    #[test]
    fn stale_or_invalid_time_is_signalled_but_not_logged() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);

        gps.time.set(None);
        let s = c.process_advertisement(&en_adv(1, 20), 100).unwrap();
        assert!(!s.persisted);

        gps.time.set(Some(time(false, 0)));
        assert!(!c.process_advertisement(&en_adv(2, 20), 200).unwrap().persisted);

        gps.time.set(Some(time(true, 1_500)));
        assert!(!c.process_advertisement(&en_adv(3, 20), 300).unwrap().persisted);

        assert_eq!(c.registry().size(), 3);
        assert_eq!(c.indicator().pulses.len(), 3);
        assert!(c.writer().sink().appends.is_empty());
        assert_eq!(liveness.last_success_ms(), 300);
    }

    #[test]
    fn fresh_time_writes_exactly_one_record() {
        let gps = FakeGps::default();
        gps.time.set(Some(time(true, 1_499)));
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);

        let s = c.process_advertisement(&en_adv(9, 20), 100).unwrap();
        assert!(s.persisted);
        let appends = &c.writer().sink().appends;
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].0, "/2026101721.jsonl");
        assert!(appends[0].1.contains(r#""bdaddr":"6e:20:31:42:53:09""#));
        assert!(appends[0].1.contains(r#""time":"21:04:33""#));
    }

    #[test]
    fn repeat_signal_depends_on_position() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);

        assert_eq!(c.process_advertisement(&en_adv(1, 20), 0).unwrap().class, Classification::New);
        assert_eq!(
            c.process_advertisement(&en_adv(1, 20), 10).unwrap().class,
            Classification::RepeatWithoutPosition
        );
        gps.position.set(Some(fix()));
        assert_eq!(
            c.process_advertisement(&en_adv(1, 20), 20).unwrap().class,
            Classification::RepeatWithPosition
        );
        // New stays New with a fix
        assert_eq!(c.process_advertisement(&en_adv(2, 20), 30).unwrap().class, Classification::New);
    }

    #[test]
    fn invalid_position_counts_as_no_fix() {
        let gps = FakeGps::default();
        gps.position.set(Some(PositionSample { valid: false, ..fix() }));
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        c.process_advertisement(&en_adv(1, 20), 0);
        let s = c.process_advertisement(&en_adv(1, 20), 10).unwrap();
        assert_eq!(s.class, Classification::RepeatWithoutPosition);
        assert!(s.position.is_none());
    }

    #[test]
    fn log_failure_is_dropped_and_pipeline_continues() {
        let gps = FakeGps::default();
        gps.time.set(Some(time(true, 0)));
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        c.writer.sink_mut().fail = true;

        let s = c.process_advertisement(&en_adv(1, 20), 50).unwrap();
        assert!(!s.persisted);
        assert_eq!(c.writer().dropped(), 1);
        assert_eq!(liveness.last_success_ms(), 50);

        c.writer.sink_mut().fail = false;
        assert!(c.process_advertisement(&en_adv(2, 20), 60).unwrap().persisted);
        assert_eq!(c.writer().sink().appends.len(), 1);
    }

    #[test]
    fn empty_payload_is_still_a_sighting() {
        let gps = FakeGps::default();
        gps.time.set(Some(time(true, 0)));
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        let s = c.process_advertisement(&en_adv(1, 0), 0).unwrap();
        assert!(s.payload.rpi.is_empty());
        assert!(s.persisted);
    }

    // ── End to end ──────────────────────────────────────────────────

    #[test]
    fn one_window_three_advertisements() {
        let gps = FakeGps::default();
        let liveness = LivenessMonitor::new(10_000, 0);
        let mut c = controller(&gps, &liveness);
        c.start().unwrap();

        // 1: not an exposure notification
        assert!(c.handle(ScanEvent::Advertisement(other_adv()), 1_000).is_none());

        // 2: exposure notification, fresh valid time, no fix
        gps.time.set(Some(time(true, 300)));
        let second = c.handle(ScanEvent::Advertisement(en_adv(7, 20)), 2_000).unwrap();
        assert_eq!(second.class, Classification::New);
        assert!(second.persisted);
        assert_eq!(second.payload.rpi.len(), 32);
        assert_eq!(second.payload.aem.len(), 8);

        // 3: same device, fix known, time gone stale
        gps.position.set(Some(fix()));
        gps.time.set(Some(time(true, 4_000)));
        let third = c.handle(ScanEvent::Advertisement(en_adv(7, 20)), 3_000).unwrap();
        assert_eq!(third.class, Classification::RepeatWithPosition);
        assert!(!third.persisted);

        c.handle(ScanEvent::CycleComplete { heard: 3 }, 10_000);

        // Both sightings share one address; the non-match never registered
        assert_eq!(c.registry().size(), 1);
        let appends = &c.writer().sink().appends;
        assert_eq!(appends.len(), 1);
        assert!(appends[0].1.contains(r#""bdaddr":"6e:20:31:42:53:07""#));
        assert!(!appends[0].1.contains("lat"));
        assert_eq!(
            c.indicator().pulses,
            vec![Classification::New, Classification::RepeatWithPosition]
        );
        assert_eq!(c.state(), CycleState::Scanning);
        assert_eq!(liveness.check(12_000), Liveness::Alive);
    }
}
