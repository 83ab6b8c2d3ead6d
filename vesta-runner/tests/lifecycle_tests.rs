//! Lifecycle ordering and loop-policy tests
//!
//! Hooks and the body are observed through a caller-supplied call log
//! shared by the closures, never through global state.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use vesta_runner::{
    Failure, Harness, HeadlessProvider, HeadlessSurface, OverrideLayer, RunNotifier, Stage,
    Statement, SwapMode, TestCase,
};

fn scratch_root(test: &str) -> PathBuf {
    let root = PathBuf::from(env!("CARGO_TARGET_TMPDIR"))
        .join("lifecycle")
        .join(test);
    if root.exists() {
        fs::remove_dir_all(&root).unwrap();
    }
    fs::create_dir_all(&root).unwrap();
    root
}

fn harness(test: &str) -> Harness<HeadlessProvider> {
    Harness::new(HeadlessProvider::new(), scratch_root(test))
}

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: &str) {
    log.borrow_mut().push(entry.to_owned());
}

#[derive(Default)]
struct RecordingNotifier {
    events: Vec<String>,
}

impl RunNotifier for RecordingNotifier {
    fn test_started(&mut self, test: &str) {
        self.events.push(format!("started:{test}"));
    }

    fn test_failure(&mut self, test: &str, failure: &Failure) {
        self.events.push(format!("failure:{test}:{}", failure.stage()));
    }

    fn test_finished(&mut self, test: &str) {
        self.events.push(format!("finished:{test}"));
    }
}

#[test]
fn hooks_and_body_run_in_declaration_order() {
    let log: Log = Log::default();

    let case = TestCase::new("ordering", {
        let log = Rc::clone(&log);
        move |_: &mut HeadlessSurface| {
            push(&log, "body");
            Ok(())
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(2).with_fps(0))
    .with_setup({
        let log = Rc::clone(&log);
        move |_| {
            push(&log, "setup1");
            Ok(())
        }
    })
    .with_setup({
        let log = Rc::clone(&log);
        move |_| {
            push(&log, "setup2");
            Ok(())
        }
    })
    .with_teardown({
        let log = Rc::clone(&log);
        move |_| {
            push(&log, "teardown");
            Ok(())
        }
    });

    let mut notifier = RecordingNotifier::default();
    let result = harness("ordering").run(case, &mut notifier);

    assert!(result.passed(), "unexpected failures: {:?}", result.failures());
    assert_eq!(
        *log.borrow(),
        ["setup1", "setup2", "body", "body", "teardown"]
    );
    assert_eq!(notifier.events, ["started:ordering", "finished:ordering"]);
}

#[test]
fn body_runs_exactly_iterations_times() {
    let count = Rc::new(RefCell::new(0_u32));

    let case = TestCase::new("count", {
        let count = Rc::clone(&count);
        move |_: &mut HeadlessSurface| {
            *count.borrow_mut() += 1;
            Ok(())
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(7).with_fps(0));

    let result = harness("count").run(case, &mut RecordingNotifier::default());

    assert!(result.passed());
    assert_eq!(*count.borrow(), 7);
}

#[test]
fn setup_failure_skips_body_but_teardown_still_runs() {
    let log: Log = Log::default();

    let case = TestCase::new("setup_fails", {
        let log = Rc::clone(&log);
        move |_: &mut HeadlessSurface| {
            push(&log, "body");
            Ok(())
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(3).with_fps(0))
    .with_setup(|_| anyhow::bail!("setup exploded"))
    .with_teardown({
        let log = Rc::clone(&log);
        move |_| {
            push(&log, "teardown");
            Ok(())
        }
    });

    let mut notifier = RecordingNotifier::default();
    let result = harness("setup_fails").run(case, &mut notifier);

    assert_eq!(*log.borrow(), ["teardown"], "body must never run");
    assert_eq!(result.failures().len(), 1);
    assert_eq!(result.failures()[0].stage(), Stage::Setup);
    assert_eq!(
        notifier.events,
        [
            "started:setup_fails",
            "failure:setup_fails:setup",
            "finished:setup_fails"
        ]
    );
}

#[test]
fn auto_swap_presents_after_every_iteration() {
    let presented: Log = Log::default();

    let case = TestCase::new("swap", {
        let presented = Rc::clone(&presented);
        move |surface: &mut HeadlessSurface| {
            push(&presented, &surface.presented().to_string());
            Ok(())
        }
    })
    .with_method_layer(
        OverrideLayer::new()
            .with_iterations(3)
            .with_fps(0)
            .with_swap(SwapMode::Auto),
    );

    let result = harness("swap").run(case, &mut RecordingNotifier::default());

    assert!(result.passed());
    // The body observes the count before the driver presents that frame.
    assert_eq!(*presented.borrow(), ["0", "1", "2"]);
}

#[test]
fn manual_swap_never_presents() {
    let presented: Log = Log::default();

    let case = TestCase::new("manual", {
        let presented = Rc::clone(&presented);
        move |surface: &mut HeadlessSurface| {
            push(&presented, &surface.presented().to_string());
            Ok(())
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(3).with_fps(0));

    let result = harness("manual").run(case, &mut RecordingNotifier::default());

    assert!(result.passed());
    assert_eq!(*presented.borrow(), ["0", "0", "0"]);
}

#[test]
fn abort_on_first_failure_stops_the_loop() {
    let count = Rc::new(RefCell::new(0_u32));

    let case = TestCase::new("abort", {
        let count = Rc::clone(&count);
        move |_: &mut HeadlessSurface| {
            *count.borrow_mut() += 1;
            anyhow::bail!("iteration failed")
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(5).with_fps(0));

    let result = harness("abort").run(case, &mut RecordingNotifier::default());

    assert_eq!(*count.borrow(), 1, "default policy stops after one failure");
    assert_eq!(result.failures().len(), 1);
}

#[test]
fn continue_policy_collects_every_iteration_failure() {
    let count = Rc::new(RefCell::new(0_u32));

    let case = TestCase::new("continue", {
        let count = Rc::clone(&count);
        move |_: &mut HeadlessSurface| {
            *count.borrow_mut() += 1;
            anyhow::bail!("iteration failed")
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(5).with_fps(0));

    let result = harness("continue")
        .with_abort_on_failure(false)
        .run(case, &mut RecordingNotifier::default());

    assert_eq!(*count.borrow(), 5, "continue policy runs every iteration");
    assert_eq!(result.failures().len(), 5);
}

#[test]
fn rules_compose_outer_to_inner_in_declaration_order() {
    let log: Log = Log::default();

    let case = TestCase::new("rules", {
        let log = Rc::clone(&log);
        move |_: &mut HeadlessSurface| {
            push(&log, "body");
            Ok(())
        }
    })
    .with_method_layer(OverrideLayer::new().with_iterations(1).with_fps(0))
    .with_rule({
        let log = Rc::clone(&log);
        move |next: &mut dyn Statement| {
            push(&log, "outer:before");
            let result = next.evaluate();
            push(&log, "outer:after");
            result
        }
    })
    .with_rule({
        let log = Rc::clone(&log);
        move |next: &mut dyn Statement| {
            push(&log, "inner:before");
            let result = next.evaluate();
            push(&log, "inner:after");
            result
        }
    });

    let result = harness("rules").run(case, &mut RecordingNotifier::default());

    assert!(result.passed());
    assert_eq!(
        *log.borrow(),
        [
            "outer:before",
            "inner:before",
            "body",
            "inner:after",
            "outer:after"
        ]
    );
}

#[test]
fn rule_error_without_delegation_reports_a_harness_failure() {
    let log: Log = Log::default();

    let case = TestCase::new("veto", {
        let log = Rc::clone(&log);
        move |_: &mut HeadlessSurface| {
            push(&log, "body");
            Ok(())
        }
    })
    .with_rule(|_next: &mut dyn Statement| anyhow::bail!("rule veto"));

    let mut notifier = RecordingNotifier::default();
    let result = harness("veto").run(case, &mut notifier);

    assert!(log.borrow().is_empty(), "the wrapped statement never ran");
    assert_eq!(result.failures().len(), 1);
    assert_eq!(result.failures()[0].stage(), Stage::Harness);
    // No started/finished notifications: the statement never evaluated.
    assert_eq!(notifier.events, ["failure:veto:harness"]);
}

#[test]
fn surface_creation_failure_aborts_the_invocation() {
    let log: Log = Log::default();

    let case = TestCase::new("degenerate", {
        let log = Rc::clone(&log);
        move |_: &mut HeadlessSurface| {
            push(&log, "body");
            Ok(())
        }
    })
    .with_method_layer(OverrideLayer::new().with_window(0, 0));

    let mut notifier = RecordingNotifier::default();
    let result = harness("degenerate").run(case, &mut notifier);

    assert!(log.borrow().is_empty(), "no hook may run without a surface");
    assert_eq!(result.failures().len(), 1);
    assert_eq!(result.failures()[0].stage(), Stage::Harness);
    assert_eq!(
        notifier.events,
        ["started:degenerate", "failure:degenerate:harness"]
    );
}

#[test]
fn fatal_present_failure_skips_teardown() {
    let log: Log = Log::default();

    let case = TestCase::new("present_fault", {
        let log = Rc::clone(&log);
        move |_: &mut HeadlessSurface| {
            push(&log, "body");
            Ok(())
        }
    })
    .with_method_layer(
        OverrideLayer::new()
            .with_iterations(3)
            .with_fps(0)
            .with_swap(SwapMode::Auto),
    )
    .with_setup(|surface: &mut HeadlessSurface| {
        surface.set_fail_present(true);
        Ok(())
    })
    .with_teardown({
        let log = Rc::clone(&log);
        move |_| {
            push(&log, "teardown");
            Ok(())
        }
    });

    let mut notifier = RecordingNotifier::default();
    let result = harness("present_fault").run(case, &mut notifier);

    assert_eq!(
        *log.borrow(),
        ["body"],
        "present fails after the first body, teardown is skipped"
    );
    assert_eq!(result.failures().len(), 1);
    assert_eq!(result.failures()[0].stage(), Stage::Present);
    assert_eq!(
        notifier.events,
        [
            "started:present_fault",
            "failure:present_fault:present",
            "finished:present_fault"
        ]
    );
}
