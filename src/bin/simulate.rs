use cellclaim_server::engine::Level;
use cellclaim_server::game::Game;
use cellclaim_server::rng::Rng;
use cellclaim_server::server_utils::normalize_seed;
use cellclaim_server::types::{
    CellKind, Direction, GameConfig, LevelState, RuntimeEvent, Snapshot,
};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Run a single custom scenario instead of the default batch.
    #[arg(long)]
    single: bool,
    #[arg(long)]
    columns: Option<i32>,
    #[arg(long)]
    rows: Option<i32>,
    #[arg(long)]
    roamers: Option<usize>,
    #[arg(long)]
    patrollers: Option<usize>,
    #[arg(long)]
    win_ratio: Option<f32>,
    #[arg(long)]
    lives: Option<i32>,
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    seed: u32,
    #[serde(rename = "maxTicks")]
    max_ticks: u64,
    config: GameConfig,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    outcome: LevelState,
    ticks: u64,
    #[serde(rename = "finalRatio")]
    final_ratio: f32,
    #[serde(rename = "maxRatio")]
    max_ratio: f32,
    #[serde(rename = "claimsCompleted")]
    claims_completed: i32,
    #[serde(rename = "claimsBroken")]
    claims_broken: i32,
    #[serde(rename = "livesLost")]
    lives_lost: i32,
    #[serde(rename = "cellsRepaired")]
    cells_repaired: i32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageTicks")]
    average_ticks: u64,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    timestamp: String,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let started_at = now_iso();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, Utc::now().timestamp_millis()));

    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_ticks = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "config": scenario.config,
                "maxTicks": scenario.max_ticks,
            }),
        );

        let scenario_run = match run_scenario(&scenario) {
            Ok(scenario_run) => scenario_run,
            Err(error) => {
                emit_log(
                    "error",
                    "scenario_failed",
                    &match_id,
                    Some(&scenario.name),
                    Some(scenario.seed),
                    None,
                    json!({ "error": error }),
                );
                std::process::exit(2);
            }
        };

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({ "message": anomaly.message }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_ticks += scenario_run.result.ticks;
        *outcome_counts
            .entry(outcome_key(scenario_run.result.outcome))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.result.ticks),
            json!({
                "outcome": scenario_run.result.outcome,
                "finalRatio": scenario_run.result.final_ratio,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&scenario_run.result).expect("scenario result should serialize")
        );
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        started_at,
        now_iso(),
        scenario_results,
        outcome_counts,
        total_anomalies,
        total_ticks,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageTicks": summary.average_ticks,
            "outcomeCounts": summary.outcome_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

/// Scripted stand-in for a human player: heads for the unclaimed
/// interior, presses on while tracing a path and occasionally turns to
/// close a box. Deterministic per seed.
struct Autopilot {
    rng: Rng,
    last: Direction,
    hold: u32,
}

impl Autopilot {
    fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed ^ 0x5eed),
            last: Direction::Down,
            hold: 0,
        }
    }

    fn choose(&mut self, level: &Level) -> Direction {
        if self.hold > 0 {
            self.hold -= 1;
            return self.last;
        }
        self.hold = self.rng.int(2, 6) as u32;

        let player = level.player().coords;
        let on_path = level.board().kind_at(player.x, player.y) == CellKind::Live;

        let next = if on_path {
            if self.rng.bool(0.6) {
                self.last
            } else {
                self.turn_perpendicular()
            }
        } else {
            self.towards_interior(level, player.x, player.y)
        };
        self.last = next;
        next
    }

    fn turn_perpendicular(&mut self) -> Direction {
        let flip = self.rng.bool(0.5);
        match self.last {
            Direction::Up | Direction::Down => {
                if flip {
                    Direction::Left
                } else {
                    Direction::Right
                }
            }
            Direction::Left | Direction::Right => {
                if flip {
                    Direction::Up
                } else {
                    Direction::Down
                }
            }
        }
    }

    fn towards_interior(&mut self, level: &Level, x: i32, y: i32) -> Direction {
        let cx = level.board().columns() / 2;
        let cy = level.board().rows() / 2;
        let dx = cx - x;
        let dy = cy - y;

        let horizontal = if dx >= 0 {
            Direction::Right
        } else {
            Direction::Left
        };
        let vertical = if dy >= 0 {
            Direction::Down
        } else {
            Direction::Up
        };

        // Usually take the longer axis, with some wobble so runs differ.
        if dx.abs() > dy.abs() {
            if self.rng.bool(0.75) {
                horizontal
            } else {
                vertical
            }
        } else if self.rng.bool(0.75) {
            vertical
        } else {
            horizontal
        }
    }
}

fn run_scenario(scenario: &Scenario) -> Result<ScenarioRunResult, String> {
    let mut game = Game::new(scenario.config).map_err(|error| error.to_string())?;
    let level = game.start_level(scenario.seed);
    let mut autopilot = Autopilot::new(scenario.seed);

    let mut max_ratio = 0.0f32;
    let mut claims_completed = 0;
    let mut claims_broken = 0;
    let mut lives_lost = 0;
    let mut cells_repaired = 0;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut last_tick = 0u64;

    while level.is_running() && level.tick_counter() < scenario.max_ticks {
        let direction = autopilot.choose(level);
        level.set_player_direction(direction);
        level.step();
        let snapshot = level.build_snapshot(true);
        last_tick = snapshot.tick;

        for message in collect_snapshot_anomalies(&snapshot, &scenario.config) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }

        max_ratio = max_ratio.max(snapshot.claimed_ratio);
        for event in &snapshot.events {
            match event {
                RuntimeEvent::ClaimCompleted { .. } => claims_completed += 1,
                RuntimeEvent::ClaimBroken { .. } => claims_broken += 1,
                RuntimeEvent::LifeLost { .. } => lives_lost += 1,
                // Repairs are recoverable by design; they show up in the
                // result line but do not fail the run.
                RuntimeEvent::CellRepaired { .. } => cells_repaired += 1,
                _ => {}
            }
        }
    }

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            outcome: level.state(),
            ticks: last_tick,
            final_ratio: round_ratio(level.claimed_ratio()),
            max_ratio: round_ratio(max_ratio),
            claims_completed,
            claims_broken,
            lives_lost,
            cells_repaired,
            anomalies,
        },
        anomaly_records,
    })
}

fn collect_snapshot_anomalies(snapshot: &Snapshot, config: &GameConfig) -> Vec<String> {
    let mut anomalies = Vec::new();
    if !snapshot.claimed_ratio.is_finite()
        || snapshot.claimed_ratio < 0.0
        || snapshot.claimed_ratio > 1.0
    {
        anomalies.push(format!("invalid claimed ratio: {}", snapshot.claimed_ratio));
    }

    let live_glyph = CellKind::Live.glyph();
    let has_live = snapshot.tiles.iter().any(|row| row.contains(live_glyph));
    if has_live != snapshot.claiming {
        anomalies.push(format!(
            "claiming flag {} disagrees with live cells on the board",
            snapshot.claiming
        ));
    }

    let expected_entities = 1 + config.patroller_count + config.roamer_count;
    if snapshot.entities.len() != expected_entities {
        anomalies.push(format!(
            "expected {} entities, snapshot has {}",
            expected_entities,
            snapshot.entities.len()
        ));
    }

    for entity in &snapshot.entities {
        if entity.x < 0 || entity.y < 0 || entity.x >= config.columns || entity.y >= config.rows {
            anomalies.push(format!(
                "entity off the board at ({}, {})",
                entity.x, entity.y
            ));
        }
    }

    if snapshot.state == LevelState::Lost && snapshot.lives > 0 {
        anomalies.push(format!("lost with {} lives remaining", snapshot.lives));
    }
    if snapshot.state == LevelState::Running && snapshot.lives <= 0 {
        anomalies.push("still running with no lives".to_string());
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(|| {
        Utc::now().timestamp_millis() as u64
    }));

    if cli.single
        || cli.columns.is_some()
        || cli.rows.is_some()
        || cli.roamers.is_some()
        || cli.patrollers.is_some()
    {
        let defaults = GameConfig::default();
        let config = GameConfig {
            columns: cli.columns.unwrap_or(defaults.columns),
            rows: cli.rows.unwrap_or(defaults.rows),
            roamer_count: cli.roamers.unwrap_or(defaults.roamer_count),
            patroller_count: cli.patrollers.unwrap_or(defaults.patroller_count),
            win_ratio: cli.win_ratio.unwrap_or(defaults.win_ratio),
            lives: cli.lives.unwrap_or(defaults.lives),
            ..defaults
        };
        return vec![Scenario {
            name: format!("custom-{}x{}", config.columns, config.rows),
            seed,
            max_ticks: cli.ticks.unwrap_or(9_000),
            config,
        }];
    }

    vec![
        Scenario {
            name: "quick-default".to_string(),
            seed,
            max_ticks: cli.ticks.unwrap_or(9_000),
            config: GameConfig::default(),
        },
        Scenario {
            name: "dense-roamers".to_string(),
            seed: normalize_seed(seed as u64 + 1),
            max_ticks: cli.ticks.unwrap_or(9_000),
            config: GameConfig {
                roamer_count: 4,
                ..GameConfig::default()
            },
        },
        Scenario {
            name: "small-board".to_string(),
            seed: normalize_seed(seed as u64 + 2),
            max_ticks: cli.ticks.unwrap_or(9_000),
            config: GameConfig {
                columns: 20,
                rows: 14,
                ..GameConfig::default()
            },
        },
    ]
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: i64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn round_ratio(ratio: f32) -> f32 {
    (ratio * 1000.0).round() / 1000.0
}

fn outcome_key(state: LevelState) -> String {
    match state {
        LevelState::Running => "timeout",
        LevelState::Won => "won",
        LevelState::Lost => "lost",
    }
    .to_string()
}

fn build_run_summary(
    match_id: String,
    started_at: String,
    finished_at: String,
    scenarios: Vec<ScenarioResultLine>,
    outcome_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_ticks: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_ticks = if scenario_count == 0 {
        0
    } else {
        total_ticks / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at,
        finished_at,
        scenario_count,
        anomaly_count,
        average_ticks,
        outcome_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp: now_iso(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    eprintln!(
        "{}",
        serde_json::to_string(&log_line).expect("structured log should serialize")
    );
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).expect("run summary should serialize");
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario(seed: u32, max_ticks: u64) -> Scenario {
        Scenario {
            name: "test".to_string(),
            seed,
            max_ticks,
            config: GameConfig::default(),
        }
    }

    fn make_scenario_result(outcome: LevelState, ticks: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            outcome,
            ticks,
            final_ratio: 0.0,
            max_ratio: 0.0,
            claims_completed: 0,
            claims_broken: 0,
            lives_lost: 0,
            cells_repaired: 0,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_ticks() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            "start".to_string(),
            "finish".to_string(),
            vec![
                make_scenario_result(LevelState::Won, 600),
                make_scenario_result(LevelState::Lost, 400),
            ],
            BTreeMap::from([("won".to_string(), 1usize), ("lost".to_string(), 1usize)]),
            1,
            1_000,
        );
        assert_eq!(summary.average_ticks, 500);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(
            &mut anomalies,
            &mut records,
            &mut seen,
            10,
            "same anomaly".to_string(),
        );
        push_anomaly(
            &mut anomalies,
            &mut records,
            &mut seen,
            11,
            "same anomaly".to_string(),
        );

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tick, 10);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("cellclaim-missing-{}", Utc::now().timestamp_millis()))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            "start".to_string(),
            "finish".to_string(),
            vec![make_scenario_result(LevelState::Won, 600)],
            BTreeMap::from([("won".to_string(), 1usize)]),
            0,
            600,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn scenario_runs_are_deterministic_per_seed() {
        let scenario = make_scenario(77, 500);
        let a = run_scenario(&scenario).expect("scenario should run");
        let b = run_scenario(&scenario).expect("scenario should run");
        assert_eq!(a.result.ticks, b.result.ticks);
        assert_eq!(
            a.result.final_ratio.to_bits(),
            b.result.final_ratio.to_bits()
        );
        assert_eq!(a.result.claims_completed, b.result.claims_completed);
        assert_eq!(a.result.lives_lost, b.result.lives_lost);
    }

    #[test]
    fn scenario_with_broken_config_reports_the_error() {
        let mut scenario = make_scenario(1, 100);
        scenario.config.win_ratio = 2.0;
        let error = run_scenario(&scenario).expect_err("invalid config should fail");
        assert!(error.contains("win ratio"));
    }

    #[test]
    fn snapshot_anomaly_checks_flag_corrupted_state() {
        let config = GameConfig::default();
        let snapshot = Snapshot {
            tick: 1,
            state: LevelState::Running,
            lives: 3,
            claimed_ratio: 1.5,
            win_ratio: 0.65,
            claiming: true,
            tiles: vec!["....".to_string()],
            entities: vec![],
            events: vec![],
        };
        let anomalies = collect_snapshot_anomalies(&snapshot, &config);
        assert!(anomalies.iter().any(|a| a.contains("invalid claimed ratio")));
        assert!(anomalies.iter().any(|a| a.contains("claiming flag")));
        assert!(anomalies.iter().any(|a| a.contains("expected")));
    }
}
