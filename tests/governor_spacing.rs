use std::rc::Rc;

use drift::core::random::Randomness;
use drift::core::timebase::{Clock, ManualClock, Millis};
use drift::life::activity::ActivityParams;
use drift::life::agent::{Agent, AgentTiming};
use drift::life::behavior::AgentKind;
use drift::life::conductor::ConductorParams;
use drift::life::ensemble::Ensemble;
use drift::life::synth::{RecordingSynth, SynthLog};

fn crowded_ensemble(clock: &ManualClock, log: &SynthLog, seed: u64) -> Ensemble {
    let shared: Rc<dyn Clock> = Rc::new(clock.clone());
    let params = ConductorParams {
        max_concurrent_agents: 12,
        ..ConductorParams::default()
    };
    let mut ensemble = Ensemble::new(shared.clone(), params, ActivityParams::default(), seed);
    for i in 0..12 {
        let kind = AgentKind::ALL[i % AgentKind::ALL.len()];
        let name = format!("{}-{i}", kind.key());
        let timing = AgentTiming {
            enabled: true,
            min_interval_ms: 500,
            max_interval_ms: 3_000,
            volume: 0.3,
        };
        let synth = Box::new(RecordingSynth::new(name.clone(), shared.clone(), log.clone()));
        let rng = ensemble.fork_rng();
        let agent = Agent::new(name, timing, kind.behavior(), synth, ensemble.deps(), rng)
            .expect("valid agent");
        ensemble.add_agent(agent).expect("unique name");
    }
    ensemble.init_all().expect("init");
    ensemble
}

#[test]
fn committed_triggers_never_crowd_the_governor() {
    for seed in 0..6 {
        let clock = ManualClock::new(0);
        let log = SynthLog::new();
        let mut ensemble = crowded_ensemble(&clock, &log, seed);
        ensemble.schedule_opening(0, "texture-1");
        ensemble.start();

        let mut steps = Randomness::from_seed(seed ^ 0xABCD);
        let mut commits: Vec<Millis> = Vec::new();
        while clock.now_ms() < 5 * 60 * 1_000 {
            clock.advance(steps.range_int(1, 120) as Millis);
            let report = ensemble.tick().expect("tick");
            commits.extend(report.triggered.iter().map(|_| report.now_ms));
        }

        assert!(commits.len() > 10, "seed {seed}: only {} triggers", commits.len());
        for pair in commits.windows(2) {
            assert!(
                pair[1] - pair[0] >= 500,
                "seed {seed}: triggers at {} and {}",
                pair[0],
                pair[1]
            );
        }
        let governor = ensemble.conductor().governor();
        assert_eq!(governor.last_trigger, commits.last().copied());
    }
}

#[test]
fn playing_cap_limits_simultaneous_agents() {
    let clock = ManualClock::new(0);
    let log = SynthLog::new();
    let shared: Rc<dyn Clock> = Rc::new(clock.clone());
    let mut ensemble = Ensemble::new(
        shared.clone(),
        ConductorParams {
            max_concurrent_agents: 2,
            evolve_state: false,
            ..ConductorParams::default()
        },
        ActivityParams::default(),
        3,
    );
    ensemble.conductor().set_mood(0.2);
    ensemble.conductor().set_tension(0.5);
    for i in 0..5 {
        let name = format!("atmosphere-{i}");
        let synth = Box::new(RecordingSynth::new(name.clone(), shared.clone(), log.clone()));
        let rng = ensemble.fork_rng();
        let agent = Agent::new(
            name,
            AgentTiming {
                enabled: true,
                min_interval_ms: 0,
                max_interval_ms: 0,
                volume: 0.3,
            },
            AgentKind::Atmosphere.behavior(),
            synth,
            ensemble.deps(),
            rng,
        )
        .expect("valid agent");
        ensemble.add_agent(agent).expect("unique name");
    }
    ensemble.init_all().expect("init");
    ensemble.start();

    // Heartbeat trains outlast these 15 s.
    for _ in 0..300 {
        clock.advance(50);
        ensemble.tick().expect("tick");
        assert!(ensemble.playing_count() <= 2, "{} playing", ensemble.playing_count());
    }
    assert_eq!(ensemble.playing_count(), 2);
}
