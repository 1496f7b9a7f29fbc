//! End-to-end scenarios for the pipeline runner.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancelOutcome;
    use crate::core::StageStatus::{AwaitingHuman, Done, Running, Waiting};
    use crate::core::{RunInputs, RunStatus, StageStatus};
    use crate::errors::{GateError, RunnerError};
    use crate::gate::{HumanResponse, ResponseCommand, UnmatchedPromptPolicy};
    use crate::logging::LogFallback;
    use crate::observer::{CollectingObserver, MockPipelineObserver, ObserverEvent};
    use crate::pipeline::{PipelineRunner, RunnerConfig};
    use crate::stages::{StageRegistry, CAROUSEL_STAGE_LABELS};
    use crate::testing::{
        assert_monotonic, max_concurrently_awaiting, observed_timeline, ApprovalStage, FailingStage,
        PanickingStage, ScriptedStage, StallingStage,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn quiet_config() -> RunnerConfig {
        RunnerConfig::default().with_log_fallback(LogFallback::Discard)
    }

    fn scripted_registry() -> StageRegistry {
        CAROUSEL_STAGE_LABELS
            .iter()
            .fold(StageRegistry::new(), |registry, label| {
                registry.with_stage(ScriptedStage::new(*label).with_line(format!("{label}: working")))
            })
    }

    fn runner(registry: StageRegistry, config: RunnerConfig) -> (PipelineRunner, Arc<CollectingObserver>) {
        let observer = Arc::new(CollectingObserver::new());
        let runner = PipelineRunner::new(registry, config, observer.clone()).unwrap();
        (runner, observer)
    }

    fn inputs() -> RunInputs {
        RunInputs::new("Future of sustainable aviation fuel")
    }

    fn prompt_count(events: &[ObserverEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, ObserverEvent::Prompt { .. }))
            .count()
    }

    async fn wait_for_prompts(observer: &CollectingObserver, count: usize) {
        assert!(
            observer
                .wait_until(WAIT, |events| prompt_count(events) >= count)
                .await,
            "timed out waiting for prompt #{count}"
        );
    }

    async fn wait_for_status(observer: &CollectingObserver, stage_index: usize, status: StageStatus) {
        assert!(
            observer
                .wait_until(WAIT, |events| events.iter().any(|event| matches!(
                    event,
                    ObserverEvent::Progress { stage_index: i, status: s } if *i == stage_index && *s == status
                )))
                .await,
            "timed out waiting for stage {stage_index} to become {status}"
        );
    }

    #[tokio::test]
    async fn test_completed_run() {
        let (runner, observer) = runner(scripted_registry(), quiet_config());

        let handle = runner.start(inputs(), true).unwrap();
        let result = tokio::time::timeout(WAIT, runner.wait(handle)).await.unwrap().unwrap();

        assert!(result.success);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.run_id, handle.run_id);
        assert!(!runner.is_active());

        let timeline = observed_timeline(&observer, 5);
        for statuses in &timeline {
            assert_eq!(statuses, &vec![Waiting, Running, Done]);
        }

        let logs = observer.logs();
        assert!(logs[0].starts_with("Launching pipeline for 'Future of sustainable aviation fuel'"));
        assert!(logs.contains(&"Research briefing: working".to_string()));
        assert_eq!(logs.last().map(String::as_str), Some("Pipeline completed."));
        assert_eq!(observer.results().len(), 1);
        assert!(observer.errors().is_empty());

        let snapshot = runner.snapshot().unwrap();
        assert_eq!(snapshot.run_status, RunStatus::Completed);
        assert_eq!(snapshot.statuses(), vec![Done; 5]);
    }

    #[tokio::test]
    async fn test_failure_on_third_stage_stops_run() {
        let registry = StageRegistry::new()
            .with_stage(ScriptedStage::new("Research briefing"))
            .with_stage(ScriptedStage::new("Visual design direction"))
            .with_stage(FailingStage::new("Narrative structuring", "model returned no outline"))
            .with_stage(ScriptedStage::new("HTML layout"))
            .with_stage(ScriptedStage::new("PDF rendering"));
        let (runner, observer) = runner(registry, quiet_config());

        let handle = runner.start(inputs(), true).unwrap();
        let result = tokio::time::timeout(WAIT, runner.wait(handle)).await.unwrap().unwrap();

        assert!(!result.success);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Stage 'Narrative structuring' failed: model returned no outline")
        );

        let timeline = observed_timeline(&observer, 5);
        assert_eq!(timeline[0], vec![Waiting, Running, Done]);
        assert_eq!(timeline[1], vec![Waiting, Running, Done]);
        assert_eq!(timeline[2], vec![Waiting, Running]);
        assert_eq!(timeline[3], vec![Waiting]);
        assert_eq!(timeline[4], vec![Waiting]);

        // on_error once, then the single result.
        let events = observer.events();
        let error_at = events.iter().position(|e| matches!(e, ObserverEvent::Error { .. })).unwrap();
        let finished_at = events.iter().position(ObserverEvent::is_finished).unwrap();
        assert!(error_at < finished_at);
        assert_eq!(observer.errors().len(), 1);
        assert_eq!(observer.results().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_stage_fails_run() {
        let registry = StageRegistry::new()
            .with_stage(ScriptedStage::new("Research briefing"))
            .with_stage(PanickingStage::new("Visual design direction"));
        let config = quiet_config().with_prompt_stage_map(vec![0]);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), false).unwrap();
        let result = tokio::time::timeout(WAIT, runner.wait(handle)).await.unwrap().unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            observer.errors(),
            vec!["Stage 'Visual design direction' panicked: Visual design direction crashed"]
        );
    }

    #[tokio::test]
    async fn test_full_approval_flow() {
        let briefing = Arc::new(ApprovalStage::new("Research briefing", "Press enter to continue"));
        let design = Arc::new(ApprovalStage::new("Visual design direction", "Type 'yes' to proceed"));
        let layout = Arc::new(ApprovalStage::new("HTML layout", "Any changes to the layout?"));

        let mut registry = StageRegistry::new();
        registry.register(briefing.clone());
        registry.register(design.clone());
        registry.register(Arc::new(ScriptedStage::new("Narrative structuring")));
        registry.register(layout.clone());
        registry.register(Arc::new(ScriptedStage::new("PDF rendering")));
        let (runner, observer) = runner(registry, quiet_config());

        let handle = runner.start(inputs(), true).unwrap();

        wait_for_prompts(&observer, 1).await;
        assert_eq!(runner.pending_prompt().map(|p| p.stage_index), Some(0));
        runner.respond(ResponseCommand::Approve).unwrap();

        wait_for_prompts(&observer, 2).await;
        assert_eq!(runner.pending_prompt().map(|p| p.stage_index), Some(1));
        runner.respond(ResponseCommand::Approve).unwrap();

        wait_for_prompts(&observer, 3).await;
        assert_eq!(runner.pending_prompt().map(|p| p.stage_index), Some(3));
        runner.respond(ResponseCommand::text("Use a darker palette")).unwrap();

        let result = tokio::time::timeout(WAIT, runner.wait(handle)).await.unwrap().unwrap();
        assert!(result.success);

        assert_eq!(briefing.responses(), vec![HumanResponse::blank()]);
        assert_eq!(design.responses(), vec![HumanResponse::literal("yes")]);
        assert_eq!(layout.responses(), vec![HumanResponse::literal("Use a darker palette")]);

        let timeline = observed_timeline(&observer, 5);
        assert_eq!(timeline[0], vec![Waiting, Running, AwaitingHuman, Running, Done]);
        assert_eq!(timeline[1], vec![Waiting, Running, AwaitingHuman, Running, Done]);
        assert_eq!(timeline[2], vec![Waiting, Running, Done]);
        assert_eq!(timeline[3], vec![Waiting, Running, AwaitingHuman, Running, Done]);
        assert_eq!(timeline[4], vec![Waiting, Running, Done]);
        assert_eq!(max_concurrently_awaiting(&observer.events(), 5), 1);
    }

    #[tokio::test]
    async fn test_catch_up_burst_from_single_stage() {
        let asker = Arc::new(
            ApprovalStage::new("Research briefing", "Approve briefing?")
                .then_ask("Approve design?")
                .then_ask("Approve layout?"),
        );
        let mut registry = StageRegistry::new();
        registry.register(asker.clone());
        for label in &CAROUSEL_STAGE_LABELS[1..] {
            registry.register(Arc::new(ScriptedStage::new(*label)));
        }
        let (runner, observer) = runner(registry, quiet_config());

        let handle = runner.start(inputs(), true).unwrap();
        for n in 1..=3 {
            wait_for_prompts(&observer, n).await;
            runner.respond(ResponseCommand::Approve).unwrap();
        }
        let result = tokio::time::timeout(WAIT, runner.wait(handle)).await.unwrap().unwrap();
        assert!(result.success);

        let prompts: Vec<usize> = observer.prompts().iter().map(|p| p.stage_index).collect();
        assert_eq!(prompts, vec![0, 1, 3]);

        let timeline = observed_timeline(&observer, 5);
        assert_monotonic(&timeline);
        // Stage 2 is acknowledged in the burst before stage 3 pauses.
        assert_eq!(timeline[2], vec![Waiting, Running, Done]);
        assert_eq!(timeline[3], vec![Waiting, AwaitingHuman, Running, Done]);
        assert_eq!(timeline[4], vec![Waiting, Running, Done]);
        assert_eq!(max_concurrently_awaiting(&observer.events(), 5), 1);
    }

    #[tokio::test]
    async fn test_requests_past_table_reuse_last_entry() {
        let asker = ApprovalStage::new("Research briefing", "first")
            .then_ask("second")
            .then_ask("third")
            .then_ask("fourth");
        let registry = StageRegistry::new()
            .with_stage(asker)
            .with_stage(ScriptedStage::new("Visual design direction"))
            .with_stage(ScriptedStage::new("Narrative structuring"))
            .with_stage(ScriptedStage::new("HTML layout"))
            .with_stage(ScriptedStage::new("PDF rendering"));
        let (runner, observer) = runner(registry, quiet_config());

        let handle = runner.start(inputs(), true).unwrap();
        for n in 1..=4 {
            wait_for_prompts(&observer, n).await;
            runner.respond(ResponseCommand::Approve).unwrap();
        }
        assert!(runner.wait(handle).await.unwrap().success);

        let prompts: Vec<usize> = observer.prompts().iter().map(|p| p.stage_index).collect();
        assert_eq!(prompts, vec![0, 1, 3, 3]);
        assert_monotonic(&observed_timeline(&observer, 5));
    }

    #[tokio::test]
    async fn test_bypass_never_pauses() {
        let asker = Arc::new(ApprovalStage::new("Research briefing", "Press enter to continue"));
        let mut registry = StageRegistry::new();
        registry.register(asker.clone());
        registry.register(Arc::new(ScriptedStage::new("PDF rendering")));
        let config = quiet_config().with_prompt_stage_map(vec![0, 1]);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), false).unwrap();
        let result = tokio::time::timeout(WAIT, runner.wait(handle)).await.unwrap().unwrap();

        assert!(result.success);
        assert!(observer.prompts().is_empty());
        assert_eq!(asker.responses(), vec![HumanResponse::default()]);
        assert!(observer.progress().iter().all(|p| p.status != AwaitingHuman));
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_human() {
        let registry = StageRegistry::new()
            .with_stage(ScriptedStage::new("Research briefing"))
            .with_stage(ApprovalStage::new("Visual design direction", "Approve palette?"))
            .with_stage(ScriptedStage::new("Narrative structuring"))
            .with_stage(ScriptedStage::new("HTML layout"))
            .with_stage(ScriptedStage::new("PDF rendering"));
        let config = quiet_config().with_prompt_stage_map(vec![1]);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_prompts(&observer, 1).await;
        assert_eq!(
            runner.snapshot().unwrap().awaiting_stage().map(|s| s.index),
            Some(1)
        );

        let outcome = tokio::time::timeout(WAIT, runner.cancel(handle))
            .await
            .expect("cancel must not deadlock")
            .unwrap();
        assert_eq!(outcome, CancelOutcome::Cooperative);

        let snapshot = runner.snapshot().unwrap();
        assert_eq!(snapshot.run_status, RunStatus::Aborted);
        assert_eq!(snapshot.statuses(), vec![Waiting; 5]);
        assert!(runner.pending_prompt().is_none());
        assert!(!runner.is_active());

        let events = observer.events();
        let abandoned = events
            .iter()
            .filter(|e| matches!(e, ObserverEvent::PromptAbandoned { .. }))
            .count();
        assert_eq!(abandoned, 1);
        assert!(observer.errors().is_empty());
        assert!(observer.logs().contains(&"Run aborted by user.".to_string()));

        let results = observer.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, RunStatus::Aborted);
        assert!(!results[0].success);

        // The stale response has nowhere to go.
        assert!(matches!(
            runner.respond(ResponseCommand::Approve),
            Err(RunnerError::Gate(GateError::NoOutstandingRequest))
        ));
        assert_monotonic(&observed_timeline(&observer, 5));
    }

    #[tokio::test]
    async fn test_forced_cancel_after_grace_period() {
        let registry = StageRegistry::new()
            .with_stage(StallingStage::stubborn("PDF rendering", Duration::from_secs(30)));
        let config = quiet_config()
            .with_prompt_stage_map(vec![0])
            .with_grace_period(Duration::from_millis(50));
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_status(&observer, 0, Running).await;

        let outcome = tokio::time::timeout(WAIT, runner.cancel(handle)).await.unwrap().unwrap();
        assert_eq!(outcome, CancelOutcome::Forced);
        assert_eq!(runner.wait(handle).await.unwrap().status, RunStatus::Aborted);
        assert_eq!(observer.results().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_cancels_wait_for_the_same_stop() {
        let registry = StageRegistry::new()
            .with_stage(StallingStage::stubborn("Research briefing", Duration::from_millis(200)))
            .with_stage(ScriptedStage::new("Visual design direction"));
        let config = quiet_config()
            .with_prompt_stage_map(vec![0])
            .with_grace_period(Duration::from_secs(2));
        let (runner, observer) = runner(registry, config);
        let runner = Arc::new(runner);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_status(&observer, 0, Running).await;

        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.cancel(handle).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The execution context is still inside its grace period.
        assert!(runner.is_active());
        assert!(matches!(
            runner.start(inputs(), true),
            Err(RunnerError::Conflict { .. })
        ));

        let second = tokio::time::timeout(WAIT, runner.cancel(handle))
            .await
            .unwrap()
            .unwrap();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, CancelOutcome::Cooperative);
        assert_eq!(second, CancelOutcome::Cooperative);
        assert!(!runner.is_active());

        let results = observer.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, RunStatus::Aborted);
        assert_eq!(runner.snapshot().unwrap().statuses(), vec![Waiting; 2]);

        // Nothing from the stopped run arrives after its result.
        let settled = observer.len();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(observer.len(), settled);
        assert!(matches!(
            observer.events().last(),
            Some(ObserverEvent::Finished { .. })
        ));
        assert_monotonic(&observed_timeline(&observer, 2));
    }

    #[tokio::test]
    async fn test_cooperative_stall_cancels_within_grace() {
        let registry = StageRegistry::new()
            .with_stage(StallingStage::cooperative("Research briefing", Duration::from_secs(30)))
            .with_stage(ScriptedStage::new("PDF rendering"));
        let config = quiet_config().with_prompt_stage_map(vec![0]);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_status(&observer, 0, Running).await;

        assert_eq!(runner.cancel(handle).await.unwrap(), CancelOutcome::Cooperative);
        // The stage error caused by cancellation is not reported as a failure.
        assert!(observer.errors().is_empty());
        assert_eq!(observer.results()[0].status, RunStatus::Aborted);
    }

    #[tokio::test]
    async fn test_start_rejected_while_active() {
        let registry = StageRegistry::new()
            .with_stage(StallingStage::cooperative("Research briefing", Duration::from_secs(30)));
        let config = quiet_config().with_prompt_stage_map(vec![0]);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_status(&observer, 0, Running).await;
        let before = runner.snapshot().unwrap();
        let events_before = observer.len();

        let err = runner.start(RunInputs::new("Another topic"), true).unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(err, RunnerError::Conflict { active_run_id } if active_run_id == handle.run_id));
        assert_eq!(runner.snapshot().unwrap(), before);
        assert_eq!(observer.len(), events_before);
        assert_eq!(runner.current_handle(), Some(handle));

        runner.cancel(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_run_after_terminal_state() {
        let (runner, observer) = runner(scripted_registry(), quiet_config());

        let first = runner.start(inputs(), false).unwrap();
        runner.wait(first).await.unwrap();
        let second = runner.start(inputs(), false).unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert!(runner.wait(second).await.unwrap().success);

        let results = observer.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].run_id, second.run_id);
        assert_eq!(runner.cancel(second).await.unwrap(), CancelOutcome::AlreadyFinished);
        assert!(matches!(runner.wait(first).await, Err(RunnerError::UnknownRun(_))));
    }

    #[tokio::test]
    async fn test_rejected_responses_keep_prompt_outstanding() {
        let asker = Arc::new(ApprovalStage::new("Research briefing", "Choose a palette"));
        let mut registry = StageRegistry::new();
        registry.register(asker.clone());
        let config = quiet_config()
            .with_prompt_stage_map(vec![0])
            .with_unmatched_prompt(UnmatchedPromptPolicy::Unhandled);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_prompts(&observer, 1).await;

        assert!(matches!(
            runner.respond(ResponseCommand::Approve),
            Err(RunnerError::Gate(GateError::UnhandledPrompt))
        ));
        assert!(matches!(
            runner.respond(ResponseCommand::text("   ")),
            Err(RunnerError::Gate(GateError::ResponseRequired))
        ));
        assert!(runner.pending_prompt().is_some());

        runner.respond(ResponseCommand::text("  warm tones ")).unwrap();
        assert!(runner.wait(handle).await.unwrap().success);
        assert_eq!(asker.responses(), vec![HumanResponse::literal("warm tones")]);
    }

    #[tokio::test]
    async fn test_quick_reject_delivers_n() {
        let asker = Arc::new(ApprovalStage::new("Research briefing", "Proceed with this outline?"));
        let mut registry = StageRegistry::new();
        registry.register(asker.clone());
        let config = quiet_config().with_prompt_stage_map(vec![0]);
        let (runner, observer) = runner(registry, config);

        let handle = runner.start(inputs(), true).unwrap();
        wait_for_prompts(&observer, 1).await;
        runner.respond(ResponseCommand::Reject).unwrap();

        assert!(runner.wait(handle).await.unwrap().success);
        assert_eq!(asker.responses(), vec![HumanResponse::literal("n")]);
    }

    #[tokio::test]
    async fn test_observer_contract_with_mock() {
        let mut observer = MockPipelineObserver::new();
        observer.expect_on_log().return_const(());
        observer.expect_on_progress().return_const(());
        observer.expect_on_prompt().never();
        observer.expect_on_error().never();
        observer
            .expect_on_finished()
            .withf(|result| result.success && result.status == RunStatus::Completed)
            .times(1)
            .return_const(());

        let runner = PipelineRunner::new(scripted_registry(), quiet_config(), Arc::new(observer)).unwrap();
        let handle = runner.start(inputs(), false).unwrap();
        assert!(runner.wait(handle).await.unwrap().success);
    }
}
