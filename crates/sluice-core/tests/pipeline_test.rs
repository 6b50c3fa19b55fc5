//! End-to-end tests for the pipeline engine

use std::collections::HashSet;
use std::time::Duration;

use sluice_core::{
    CancelCause, CollectingSink, ConstructionError, ErrorRecord, IterSource, Pipeline,
    PipelineError, StageSpec, build_pipeline,
};

const URLS: [&str; 7] = [
    "http://google.com",
    "http://facebook.com",
    "http://stackoverflow.com",
    "http://golang.org",
    "http://bad.example",
    "http://amazon.com",
    "http://down.example",
];

fn head_check(url: String) -> Result<String, ErrorRecord> {
    if url.contains(".example") {
        Err(ErrorRecord::new(url.clone(), format!("ERR:{url}")))
    } else {
        Ok(format!("OK:{url}"))
    }
}

mod scenario_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_seven_urls_width_two_every_url_once() {
        // Repeat to exercise different worker interleavings.
        for _ in 0..20 {
            let mut sink = CollectingSink::new();
            let urls: Vec<String> = URLS.iter().map(|u| u.to_string()).collect();

            let summary = build_pipeline(
                IterSource::new(urls),
                vec![StageSpec::from_fn("check", 2, head_check)],
                &mut sink,
            )
            .unwrap()
            .execute()
            .await
            .unwrap();

            assert_eq!(summary.total(), 7);
            assert_eq!(summary.results, 5);
            assert_eq!(summary.errors, 2);

            let mut seen = Vec::new();
            for result in &sink.results {
                seen.push(result.strip_prefix("OK:").unwrap().to_string());
            }
            for record in &sink.errors {
                assert_eq!(record.message, format!("ERR:{}", record.item));
                assert_eq!(record.stage.as_deref(), Some("check"));
                seen.push(record.item.clone());
            }
            seen.sort();
            let mut expected: Vec<String> = URLS.iter().map(|u| u.to_string()).collect();
            expected.sort();
            assert_eq!(seen, expected, "every url exactly once");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_counts_conserved_across_stages() {
        let mut sink = CollectingSink::new();
        let fail_on_7 = StageSpec::from_fn("sevens", 4, |n: u64| {
            if n % 7 == 0 {
                Err(ErrorRecord::new(n.to_string(), "multiple of 7"))
            } else {
                Ok(n)
            }
        });
        let fail_on_11 = StageSpec::new("elevens", 3, |n: u64| async move {
            tokio::task::yield_now().await;
            if n % 11 == 0 {
                Err(ErrorRecord::new(n.to_string(), "multiple of 11"))
            } else {
                Ok(n)
            }
        });
        let label = StageSpec::from_fn("label", 2, |n: u64| Ok(format!("item-{n}")));

        let summary = Pipeline::builder(IterSource::new(0..1000u64))
            .stage(fail_on_7)
            .stage(fail_on_11)
            .stage(label)
            .build(&mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.total(), 1000);
        let sevens = (0..1000u64).filter(|n| n % 7 == 0).count();
        let elevens = (0..1000u64).filter(|n| n % 7 != 0 && n % 11 == 0).count();
        assert_eq!(sink.errors.len(), sevens + elevens);
        assert_eq!(sink.results.len(), 1000 - sevens - elevens);

        let unique: HashSet<_> = sink.results.iter().collect();
        assert_eq!(unique.len(), sink.results.len(), "no duplicates");
    }

    #[tokio::test]
    async fn test_blocking_stage_end_to_end() {
        let mut sink = CollectingSink::new();
        let stage = StageSpec::blocking("square", 2, |n: u32| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(n * n)
        });

        let summary = build_pipeline(IterSource::new(1..=10u32), vec![stage], &mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.results, 10);
        let mut results = sink.results.clone();
        results.sort_unstable();
        assert_eq!(results, (1..=10).map(|n| n * n).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_buffered_capacity_behaves_like_rendezvous() {
        let mut sink = CollectingSink::new();
        let summary = Pipeline::builder(IterSource::new(0..200u32))
            .stage(StageSpec::from_fn("inc", 3, |n: u32| Ok(n + 1)))
            .capacity(16)
            .build(&mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.results, 200);
        assert_eq!(sink.results.iter().map(|&n| n as u64).sum::<u64>(), (1..=200u64).sum::<u64>());
    }
}

mod cancellation_tests {
    use super::*;

    fn slow_stage() -> StageSpec<u64, u64> {
        StageSpec::new("slow", 2, |n: u64| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(n)
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_terminates_unbounded_source() {
        let mut sink = CollectingSink::new();
        let pipeline = build_pipeline(IterSource::new(0u64..), vec![slow_stage()], &mut sink)
            .unwrap();

        let handle = pipeline.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.execute())
            .await
            .expect("cancellation must end the run")
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.cancel_cause(), Some(CancelCause::Requested));
        match err {
            PipelineError::Cancelled { summary, .. } => {
                assert_eq!(summary.results as usize, sink.results.len());
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert_eq!(sink.cancelled, Some(CancelCause::Requested));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let pipeline = build_pipeline(
            IterSource::new(0u64..),
            vec![slow_stage()],
            CollectingSink::new(),
        )
        .unwrap();

        let handle = pipeline.cancel_handle();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!pipeline.cancel());
        assert!(handle.is_cancelled());

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.execute())
            .await
            .expect("pre-cancelled run must end")
            .unwrap_err();
        assert_eq!(err.cancel_cause(), Some(CancelCause::Requested));
    }

    #[tokio::test]
    async fn test_deadline_cancels_run() {
        let mut sink = CollectingSink::new();
        let pipeline = Pipeline::builder(IterSource::new(0u64..))
            .stage(slow_stage())
            .deadline(Duration::from_millis(100))
            .build(&mut sink)
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.execute())
            .await
            .expect("deadline must end the run")
            .unwrap_err();

        assert_eq!(err.cancel_cause(), Some(CancelCause::Deadline));
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[tokio::test]
    async fn test_deadline_not_reached_completes() {
        let mut sink = CollectingSink::new();
        let summary = Pipeline::builder(IterSource::new(0..3u64))
            .stage(slow_stage())
            .deadline(Duration::from_secs(30))
            .build(&mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.results, 3);
        assert_eq!(sink.cancelled, None);
    }

    #[tokio::test]
    async fn test_max_failures_halts_run() {
        let mut sink = CollectingSink::new();
        let always_fail = StageSpec::from_fn("fail", 2, |n: u64| -> Result<u64, ErrorRecord> {
            Err(ErrorRecord::new(n.to_string(), "nope"))
        });

        let err = Pipeline::builder(IterSource::new(0u64..))
            .stage(always_fail)
            .max_failures(3)
            .build(&mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap_err();

        assert_eq!(
            err.cancel_cause(),
            Some(CancelCause::MaxFailures { count: 3 })
        );
        assert_eq!(sink.errors.len(), 3);
    }

    #[tokio::test]
    async fn test_errors_alone_do_not_halt_by_default() {
        let mut sink = CollectingSink::new();
        let always_fail = StageSpec::from_fn("fail", 2, |n: u64| -> Result<u64, ErrorRecord> {
            Err(ErrorRecord::new(n.to_string(), "nope"))
        });

        let summary = build_pipeline(IterSource::new(0..50u64), vec![always_fail], &mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.errors, 50);
        assert!(sink.results.is_empty());
    }
}

mod failure_tests {
    use super::*;

    #[test]
    fn test_zero_width_rejected_before_running() {
        let err = build_pipeline(
            IterSource::new(vec![1u32]),
            vec![StageSpec::from_fn("noop", 0, |n: u32| Ok(n))],
            CollectingSink::new(),
        )
        .err()
        .unwrap();

        assert_eq!(
            err,
            ConstructionError::ZeroWidth {
                stage: "noop".to_string()
            }
        );
        assert!(err.to_string().contains("zero fan-out width"));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let mut sink = CollectingSink::new();
        let stage = StageSpec::from_fn("boom", 1, |n: u32| {
            if n == 3 {
                panic!("boom on {n}");
            }
            Ok(n)
        });

        let err = build_pipeline(IterSource::new(0..10u32), vec![stage], &mut sink)
            .unwrap()
            .execute()
            .await
            .unwrap_err();

        match err {
            PipelineError::TaskPanicked { component, message } => {
                assert_eq!(component, "boom/worker-0");
                assert_eq!(message, "boom on 3");
            }
            other => panic!("expected TaskPanicked, got {other:?}"),
        }
        assert_eq!(sink.results, vec![0, 1, 2]);
    }
}
