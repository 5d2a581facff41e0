//! End-to-end scheduler behavior over an in-memory stack.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use opcom_aar::AarAggregator;
use opcom_agents::{
    AgentError, AgentRoster, Executor, ExecutorOutput, Synthesizer, TemplateSynthesizer,
    TokenUsage,
};
use opcom_core::{
    AarNarrative, AgentProfile, AuditEvent, Campaign, CampaignAarInput, CampaignId,
    CampaignNarrative, CampaignStatus, FailurePolicy, Mission, MissionAarInput, MissionId,
    MissionStatus, Task, TaskId, TaskStatus,
};
use opcom_execution::{CampaignScheduler, MissionScheduler, SignalHub, TaskRunner};
use opcom_storage::{MemoryStorage, Storage};

/// Executor that sleeps, then fails tasks whose name is on the fail list.
struct ScriptedExecutor {
    fail: Vec<&'static str>,
    delay: Duration,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            fail: Vec::new(),
            delay: Duration::from_millis(50),
        }
    }

    fn failing(mut self, names: &[&'static str]) -> Self {
        self.fail = names.to_vec();
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        _agent: &AgentProfile,
        prompt: &str,
    ) -> Result<ExecutorOutput, AgentError> {
        tokio::time::sleep(self.delay).await;
        if self.fail.iter().any(|name| prompt.contains(name)) {
            return Err(AgentError::Executor("scripted failure".to_string()));
        }
        Ok(ExecutorOutput {
            text: "acknowledged".to_string(),
            usage: TokenUsage {
                prompt_tokens: 40,
                completion_tokens: 60,
            },
        })
    }
}

/// Synthesizer whose mission reviews fail except for the named survivors.
struct RefusingSynthesizer {
    survivors: Vec<&'static str>,
}

#[async_trait]
impl Synthesizer for RefusingSynthesizer {
    async fn mission_aar(&self, input: &MissionAarInput) -> Result<AarNarrative, AgentError> {
        if self.survivors.contains(&input.mission_name.as_str()) {
            TemplateSynthesizer.mission_aar(input).await
        } else {
            Err(AgentError::Synthesis("review rejected".to_string()))
        }
    }

    async fn campaign_aar(
        &self,
        input: &CampaignAarInput,
    ) -> Result<CampaignNarrative, AgentError> {
        TemplateSynthesizer.campaign_aar(input).await
    }
}

struct MissionSpec {
    name: &'static str,
    sequence: u32,
    policy: Option<FailurePolicy>,
    tasks: Vec<(&'static str, u32)>,
}

fn mission(name: &'static str, sequence: u32, tasks: &[(&'static str, u32)]) -> MissionSpec {
    MissionSpec {
        name,
        sequence,
        policy: None,
        tasks: tasks.to_vec(),
    }
}

fn mission_with_policy(
    name: &'static str,
    sequence: u32,
    policy: FailurePolicy,
    tasks: &[(&'static str, u32)],
) -> MissionSpec {
    MissionSpec {
        policy: Some(policy),
        ..mission(name, sequence, tasks)
    }
}

struct Fixture {
    storage: Arc<MemoryStorage>,
    campaign_id: CampaignId,
    missions: HashMap<&'static str, MissionId>,
    tasks: HashMap<&'static str, TaskId>,
}

impl Fixture {
    async fn seed(specs: Vec<MissionSpec>) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let mut campaign = Campaign::new("exercise", "take the bridge", "bridge taken");
        campaign.transition(CampaignStatus::Analyzing).unwrap();
        campaign.transition(CampaignStatus::Ready).unwrap();

        let mut missions = HashMap::new();
        let mut tasks = HashMap::new();
        let mut mission_rows = Vec::new();
        let mut task_rows = Vec::new();
        for spec in specs {
            let mut mission = Mission::new(
                campaign.id,
                spec.name,
                format!("{} statement", spec.name),
                spec.sequence,
            );
            if let Some(policy) = spec.policy {
                mission = mission.with_failure_policy(policy);
            }
            for (task_name, sequence) in spec.tasks {
                let task =
                    Task::new(mission.id, task_name, "execute", sequence).with_agent("generalist");
                tasks.insert(task_name, task.id);
                task_rows.push(task);
            }
            missions.insert(spec.name, mission.id);
            mission_rows.push(mission);
        }

        storage
            .save_campaign_plan(&campaign, &mission_rows, &task_rows)
            .await
            .unwrap();

        Self {
            storage,
            campaign_id: campaign.id,
            missions,
            tasks,
        }
    }

    fn scheduler_with(
        &self,
        executor: Arc<dyn Executor>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> CampaignScheduler {
        let signals = SignalHub::new();
        let roster = AgentRoster::new(vec![AgentProfile {
            slug: "generalist".to_string(),
            name: "Generalist".to_string(),
            description: String::new(),
            tools: Vec::new(),
        }]);
        let storage: Arc<dyn Storage> = self.storage.clone();
        let runner = Arc::new(TaskRunner::new(storage.clone(), executor, roster));
        let aar = Arc::new(AarAggregator::new(storage.clone(), synthesizer));
        let missions = Arc::new(MissionScheduler::new(
            storage.clone(),
            runner,
            aar.clone(),
            signals.clone(),
        ));
        CampaignScheduler::new(storage, missions, aar, signals)
    }

    fn scheduler(&self, executor: Arc<dyn Executor>) -> CampaignScheduler {
        self.scheduler_with(executor, Arc::new(TemplateSynthesizer))
    }

    async fn campaign(&self) -> Campaign {
        self.storage
            .load_campaign(self.campaign_id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn mission(&self, name: &str) -> Mission {
        self.storage
            .load_mission(self.missions[name])
            .await
            .unwrap()
            .unwrap()
    }

    async fn task(&self, name: &str) -> Task {
        self.storage
            .load_task(self.tasks[name])
            .await
            .unwrap()
            .unwrap()
    }
}

/// Scenario 1: {M1,M2} concurrently, barrier, then M3; inside M1: T1 then T2.
#[tokio::test]
async fn sequence_groups_order_missions_and_tasks() {
    let fixture = Fixture::seed(vec![
        mission("m1", 0, &[("alpha", 0), ("bravo", 1)]),
        mission("m2", 0, &[("charlie", 0)]),
        mission("m3", 1, &[("delta", 0)]),
    ])
    .await;

    fixture
        .scheduler(Arc::new(ScriptedExecutor::new()))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    for name in ["alpha", "bravo", "charlie", "delta"] {
        assert_eq!(fixture.task(name).await.status, TaskStatus::Complete);
    }

    // Within m1, the second sequence group starts only after the first settles.
    let alpha = fixture.task("alpha").await;
    let bravo = fixture.task("bravo").await;
    assert!(bravo.started_at.unwrap() >= alpha.completed_at.unwrap());

    // m3 starts only after both sequence-0 missions settled.
    let delta = fixture.task("delta").await;
    for name in ["m1", "m2"] {
        let settled = fixture.mission(name).await.completed_at.unwrap();
        assert!(delta.started_at.unwrap() >= settled);
    }

    // Sequence-0 siblings in different missions overlap.
    let charlie = fixture.task("charlie").await;
    assert!(alpha.started_at.unwrap() < charlie.completed_at.unwrap());
    assert!(charlie.started_at.unwrap() < alpha.completed_at.unwrap());

    let campaign = fixture.campaign().await;
    assert_eq!(campaign.status, CampaignStatus::Complete);
    assert_eq!(campaign.progress, 100);
    assert!(campaign.aar.is_some());
}

/// Scenario 2: skip policy absorbs a failure and the mission keeps going.
#[tokio::test]
async fn skip_policy_absorbs_failures() {
    let fixture = Fixture::seed(vec![mission_with_policy(
        "m1",
        0,
        FailurePolicy::Skip,
        &[("alpha", 0), ("bravo", 1)],
    )])
    .await;

    fixture
        .scheduler(Arc::new(ScriptedExecutor::new().failing(&["alpha"])))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    assert_eq!(fixture.task("alpha").await.status, TaskStatus::Skipped);
    assert_eq!(fixture.task("bravo").await.status, TaskStatus::Complete);

    let m1 = fixture.mission("m1").await;
    assert_eq!(m1.status, MissionStatus::Complete);
    let aar = m1.aar.unwrap();
    assert_eq!(aar.completed_tasks, 1);
    assert_eq!(aar.skipped_tasks, 1);

    let events = fixture
        .storage
        .list_events(fixture.campaign_id)
        .await
        .unwrap();
    assert!(events.iter().any(|e| e.event == AuditEvent::TaskSkipped));
}

/// Scenario 3: default policy halts the mission, later groups stay pending,
/// and the campaign still advances past the failed mission's group.
#[tokio::test]
async fn default_policy_halts_mission_but_not_campaign() {
    let fixture = Fixture::seed(vec![
        mission("m1", 0, &[("alpha", 0), ("bravo", 1)]),
        mission("m3", 1, &[("delta", 0)]),
    ])
    .await;

    fixture
        .scheduler(Arc::new(ScriptedExecutor::new().failing(&["alpha"])))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    assert_eq!(fixture.task("alpha").await.status, TaskStatus::Failed);
    // Never dispatched: the halt stops later groups before they start.
    assert_eq!(fixture.task("bravo").await.status, TaskStatus::Pending);

    // The mission was still reviewed.
    let m1 = fixture.mission("m1").await;
    assert_eq!(m1.status, MissionStatus::Complete);
    let aar = m1.aar.unwrap();
    assert_eq!(aar.failed_tasks, 1);

    // And the campaign advanced to the next group regardless.
    assert_eq!(fixture.task("delta").await.status, TaskStatus::Complete);
    assert_eq!(fixture.campaign().await.status, CampaignStatus::Complete);
}

/// Pause policy annotates the campaign without stopping later groups.
#[tokio::test]
async fn pause_policy_annotates_campaign_and_halts_its_mission() {
    let fixture = Fixture::seed(vec![
        mission_with_policy("m1", 0, FailurePolicy::Pause, &[("alpha", 0), ("bravo", 1)]),
        mission("m2", 1, &[("charlie", 0)]),
    ])
    .await;

    fixture
        .scheduler(Arc::new(ScriptedExecutor::new().failing(&["alpha"])))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    assert_eq!(fixture.task("alpha").await.status, TaskStatus::Failed);
    assert_eq!(fixture.task("bravo").await.status, TaskStatus::Pending);
    // Pause is observational: the next group still ran.
    assert_eq!(fixture.task("charlie").await.status, TaskStatus::Complete);

    let events = fixture
        .storage
        .list_events(fixture.campaign_id)
        .await
        .unwrap();
    assert!(events.iter().any(|e| e.event == AuditEvent::Paused));

    // Terminal status is still decided by the review.
    assert_eq!(fixture.campaign().await.status, CampaignStatus::Complete);
}

/// Settle-all: a failing sibling never prevents the others from completing.
#[tokio::test]
async fn failing_sibling_does_not_cancel_its_group() {
    let fixture = Fixture::seed(vec![mission(
        "m1",
        0,
        &[("alpha", 0), ("bravo", 0), ("charlie", 0)],
    )])
    .await;

    fixture
        .scheduler(Arc::new(ScriptedExecutor::new().failing(&["bravo"])))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    assert_eq!(fixture.task("alpha").await.status, TaskStatus::Complete);
    assert_eq!(fixture.task("bravo").await.status, TaskStatus::Failed);
    assert_eq!(fixture.task("charlie").await.status, TaskStatus::Complete);
}

/// Scenario 4 and the terminal rule: failed iff every mission failed.
#[tokio::test]
async fn campaign_fails_only_when_all_missions_fail() {
    // Every mission review refused -> every mission failed -> campaign failed.
    let fixture = Fixture::seed(vec![
        mission("m1", 0, &[("alpha", 0)]),
        mission("m2", 0, &[("bravo", 0)]),
    ])
    .await;
    fixture
        .scheduler_with(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(RefusingSynthesizer {
                survivors: Vec::new(),
            }),
        )
        .run(fixture.campaign_id)
        .await
        .unwrap();
    assert_eq!(fixture.mission("m1").await.status, MissionStatus::Failed);
    assert_eq!(fixture.mission("m2").await.status, MissionStatus::Failed);
    assert_eq!(fixture.campaign().await.status, CampaignStatus::Failed);

    // One surviving mission completes the campaign.
    let fixture = Fixture::seed(vec![
        mission("m1", 0, &[("alpha", 0)]),
        mission("m2", 0, &[("bravo", 0)]),
    ])
    .await;
    fixture
        .scheduler_with(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(RefusingSynthesizer {
                survivors: vec!["m2"],
            }),
        )
        .run(fixture.campaign_id)
        .await
        .unwrap();
    assert_eq!(fixture.mission("m1").await.status, MissionStatus::Failed);
    assert_eq!(fixture.mission("m2").await.status, MissionStatus::Complete);
    assert_eq!(fixture.campaign().await.status, CampaignStatus::Complete);
}

/// Aggregate consistency: settled sums match the rolled-up counters.
#[tokio::test]
async fn aggregates_match_settled_children() {
    let fixture = Fixture::seed(vec![
        mission("m1", 0, &[("alpha", 0), ("bravo", 0)]),
        mission("m2", 1, &[("charlie", 0)]),
    ])
    .await;

    fixture
        .scheduler(Arc::new(ScriptedExecutor::new()))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    let mut mission_total = 0u64;
    for name in ["m1", "m2"] {
        let mission = fixture.mission(name).await;
        let tasks = fixture.storage.list_tasks(mission.id).await.unwrap();
        let settled: u64 = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Complete)
            .map(|t| t.tokens)
            .sum();
        assert_eq!(mission.total_tokens, settled);
        mission_total += mission.total_tokens;
    }
    assert_eq!(fixture.campaign().await.total_tokens, mission_total);
}

/// Idempotency: re-running a settled campaign re-invokes nothing.
#[tokio::test]
async fn rerun_of_a_settled_campaign_is_a_noop() {
    let fixture = Fixture::seed(vec![mission("m1", 0, &[("alpha", 0)])]).await;
    let scheduler = fixture.scheduler(Arc::new(ScriptedExecutor::new()));

    scheduler.run(fixture.campaign_id).await.unwrap();
    let first = fixture.campaign().await;

    scheduler.run(fixture.campaign_id).await.unwrap();
    let second = fixture.campaign().await;

    assert_eq!(first.total_tokens, second.total_tokens);
    assert_eq!(second.status, CampaignStatus::Complete);
}

/// Barrier timeout: a mission that never settles is abandoned and the
/// campaign still reaches review.
#[tokio::test(start_paused = true)]
async fn barrier_timeout_abandons_unresponsive_missions() {
    let fixture = Fixture::seed(vec![
        mission("m1", 0, &[("alpha", 0)]),
        mission("m2", 1, &[("bravo", 0)]),
    ])
    .await;

    // Campaign allows one minute; alpha's executor sleeps for two hours.
    let mut campaign = fixture.campaign().await;
    campaign.timeout_minutes = Some(1);
    fixture.storage.save_campaign(&campaign).await.unwrap();

    fixture
        .scheduler(Arc::new(
            ScriptedExecutor::new().delay(Duration::from_secs(2 * 3600)),
        ))
        .run(fixture.campaign_id)
        .await
        .unwrap();

    assert_eq!(fixture.mission("m1").await.status, MissionStatus::Failed);
    let campaign = fixture.campaign().await;
    assert!(campaign.status.is_terminal());
    assert!(campaign.aar.is_some());
}
