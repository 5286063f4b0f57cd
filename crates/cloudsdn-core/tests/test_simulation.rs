use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use cloudsdn_core::{cast, Event, EventHandler, Simulation, SimulationContext};

#[derive(Clone, Serialize)]
struct TestEvent {
    value: u32,
}

struct Recorder {
    values: Vec<u32>,
    times: Vec<f64>,
    ctx: SimulationContext,
}

impl Recorder {
    fn new(ctx: SimulationContext) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            values: Vec::new(),
            times: Vec::new(),
            ctx,
        }))
    }
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            TestEvent { value } => {
                self.values.push(value);
                self.times.push(self.ctx.time());
            }
        })
    }
}

#[test]
fn events_are_processed_in_time_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Simulation::new(123);
    let recorder = Recorder::new(sim.create_context("recorder"));
    let recorder_id = sim.add_handler("recorder", recorder.clone());
    let client = sim.create_context("client");

    client.emit(TestEvent { value: 3 }, recorder_id, 3.0);
    client.emit(TestEvent { value: 1 }, recorder_id, 1.0);
    client.emit(TestEvent { value: 2 }, recorder_id, 2.0);
    sim.step_until_no_events();

    assert_eq!(recorder.borrow().values, vec![1, 2, 3]);
    assert_eq!(recorder.borrow().times, vec![1.0, 2.0, 3.0]);
    assert_eq!(sim.time(), 3.0);
}

#[test]
fn same_time_events_are_fifo() {
    let mut sim = Simulation::new(123);
    let recorder = Recorder::new(sim.create_context("recorder"));
    let recorder_id = sim.add_handler("recorder", recorder.clone());
    let client = sim.create_context("client");

    for value in 0..10 {
        client.emit(TestEvent { value }, recorder_id, 1.0);
    }
    sim.step_until_no_events();

    assert_eq!(recorder.borrow().values, (0..10).collect::<Vec<u32>>());
}

#[test]
fn cancelled_events_are_not_delivered() {
    let mut sim = Simulation::new(123);
    let recorder = Recorder::new(sim.create_context("recorder"));
    let recorder_id = sim.add_handler("recorder", recorder.clone());
    let client = sim.create_context("client");

    client.emit(TestEvent { value: 1 }, recorder_id, 1.0);
    let cancelled = client.emit(TestEvent { value: 2 }, recorder_id, 2.0);
    client.emit(TestEvent { value: 3 }, recorder_id, 3.0);
    client.cancel_event(cancelled);
    sim.step_until_no_events();

    assert_eq!(recorder.borrow().values, vec![1, 3]);
    assert_eq!(sim.time(), 3.0);
}

#[test]
fn step_for_duration_respects_the_limit() {
    let mut sim = Simulation::new(123);
    let recorder = Recorder::new(sim.create_context("recorder"));
    let recorder_id = sim.add_handler("recorder", recorder.clone());
    let client = sim.create_context("client");

    client.emit(TestEvent { value: 1 }, recorder_id, 1.0);
    client.emit(TestEvent { value: 2 }, recorder_id, 2.0);
    client.emit(TestEvent { value: 3 }, recorder_id, 3.5);

    let more = sim.step_for_duration(2.5);
    assert!(more);
    assert_eq!(recorder.borrow().values, vec![1, 2]);
    let more = sim.step_for_duration(10.0);
    assert!(!more);
    assert_eq!(recorder.borrow().values, vec![1, 2, 3]);
}

#[test]
fn component_ids_are_assigned_sequentially() {
    let mut sim = Simulation::new(123);
    let ctx1 = sim.create_context("comp1");
    let ctx2 = sim.create_context("comp2");
    assert_eq!(ctx1.id(), 0);
    assert_eq!(ctx2.id(), 1);
    assert_eq!(sim.lookup_id("comp2"), 1);
    assert_eq!(sim.lookup_name(0), "comp1");
}

#[test]
fn event_count_includes_cancelled_events() {
    let mut sim = Simulation::new(123);
    let recorder = Recorder::new(sim.create_context("recorder"));
    let recorder_id = sim.add_handler("recorder", recorder);
    let client = sim.create_context("client");

    let event_id = client.emit(TestEvent { value: 1 }, recorder_id, 1.0);
    client.emit(TestEvent { value: 2 }, recorder_id, 2.0);
    client.cancel_event(event_id);
    assert_eq!(sim.event_count(), 2);
}

#[test]
#[should_panic]
fn negative_delay_is_rejected() {
    let mut sim = Simulation::new(123);
    let recorder = Recorder::new(sim.create_context("recorder"));
    let recorder_id = sim.add_handler("recorder", recorder);
    let client = sim.create_context("client");
    client.emit(TestEvent { value: 1 }, recorder_id, -1.0);
}
