//! End-to-end runs of the grid with in-process computers.

mod common;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::time::Duration;

use common::{grid, init_tracing, LIMIT};
use spacegrid::workloads::{
    solve_sequential, City, Fibonacci, MandelbrotTask, TourBound, TspTask,
};
use spacegrid::{Computer, GridConfig, GridError, RemoteComputer, Space, TaskContext};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fibonacci_join_counts() {
    let (space, _computers) = grid::<Fibonacci>(GridConfig::development(), 2).await;

    let value = tokio::time::timeout(LIMIT, space.submit(Fibonacci::new(5), ()))
        .await
        .expect("fib(5) timed out")
        .unwrap();
    assert_eq!(value, Some(5));

    let stats = space.stats();
    let nodes = Fibonacci::tree_size(5);
    let internal = (nodes - 1) / 2;
    assert_eq!(nodes, 15);
    // every non-root node reports once into its parent's closure
    assert_eq!(stats.closure_puts, nodes - 1);
    assert_eq!(stats.joins_completed, internal);
    // decompose for every node, compose for every internal one
    assert_eq!(stats.results_ingested, nodes + internal);
    assert_eq!(stats.submissions_completed, 1);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.pending_submissions, 0);
    assert_eq!(stats.evictions, 0);

    space.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_get_their_own_result() {
    let (space, _computers) = grid::<Fibonacci>(GridConfig::development(), 3).await;

    let inputs: Vec<u32> = (4..14).collect();
    let runs = inputs.iter().map(|&n| {
        let space = space.clone();
        async move { (n, space.submit(Fibonacci::new(n), ()).await) }
    });
    let results = tokio::time::timeout(LIMIT, join_all(runs))
        .await
        .expect("submissions timed out");

    let ctx = TaskContext::detached(());
    for (n, result) in results {
        let expected = solve_sequential(Fibonacci::new(n), &ctx);
        assert_eq!(result.unwrap(), expected, "fib({})", n);
    }
    assert_eq!(space.stats().submissions_completed, inputs.len() as u64);

    space.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_production_toggles_end_to_end() {
    let config = GridConfig {
        processors: 2,
        dispatch_interval: Duration::from_millis(1),
        ..GridConfig::production()
    };
    let (space, computers) = grid::<Fibonacci>(config, 2).await;
    for computer in &computers {
        assert_eq!(computer.worker_count(), 2);
        assert_eq!(computer.task_queue_max_size().await.unwrap(), 2000);
    }

    let value = tokio::time::timeout(LIMIT, space.submit(Fibonacci::new(16), ()))
        .await
        .expect("fib(16) timed out")
        .unwrap();
    assert_eq!(value, Some(987));

    space.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tsp_matches_sequential_optimum() {
    let cities: Vec<City> = (0..9)
        .map(|i| {
            let t = i as f64;
            City::new((t * 0.9).cos() * 10.0 + t * 0.5, (t * 1.3).sin() * 8.0)
        })
        .collect();
    let ctx = TaskContext::detached(TourBound::default());
    let expected = solve_sequential(TspTask::with_split_depth(cities.clone(), 3), &ctx)
        .unwrap();

    let (space, computers) = grid::<TspTask>(GridConfig::development(), 3).await;
    let tour = tokio::time::timeout(
        LIMIT,
        space.submit(TspTask::with_split_depth(cities, 3), TourBound::default()),
    )
    .await
    .expect("tsp timed out")
    .unwrap()
    .expect("tsp pruned everything");

    assert!((tour.length - expected.length).abs() < 1e-9);
    assert_eq!(tour.route.len(), 9);
    assert!((space.shared().length() - expected.length).abs() < 1e-9);
    assert!(space.stats().broadcasts_accepted >= 1);

    // fan-out reaches the machines lazily; give the forwarders a moment
    tokio::time::sleep(Duration::from_millis(50)).await;
    for computer in &computers {
        assert!(computer.shared_value().length() <= tour.length + 1e-9);
    }

    space.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tsp_initial_bound_prunes_root() {
    let cities = vec![
        City::new(0.0, 0.0),
        City::new(3.0, 0.0),
        City::new(3.0, 4.0),
        City::new(0.0, 4.0),
    ];
    let (space, _computers) = grid::<TspTask>(GridConfig::development(), 2).await;

    let result = tokio::time::timeout(
        LIMIT,
        space.submit(TspTask::new(cities), TourBound::new(5.0)),
    )
    .await
    .expect("tsp timed out")
    .unwrap();
    assert_eq!(result, None);

    space.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mandelbrot_tiles_reassemble() {
    let job = MandelbrotTask::new(-0.7510975859375, 0.1315680625, 0.01611, 64, 256, 16);
    let direct = solve_sequential(
        MandelbrotTask { leaf_size: 64, ..job },
        &TaskContext::detached(()),
    )
    .unwrap();

    let (space, _computers) = grid::<MandelbrotTask>(GridConfig::development(), 2).await;
    let tiled = tokio::time::timeout(LIMIT, space.submit(job, ()))
        .await
        .expect("mandelbrot timed out")
        .unwrap()
        .unwrap();

    assert_eq!(tiled.width, 64);
    assert_eq!(tiled.height, 64);
    assert_eq!(tiled.counts, direct.counts);

    space.shutdown().await;
}

#[tokio::test]
async fn test_toggles_decide_worker_plan() {
    init_tracing();
    let cases = [
        (false, false, 1, 1),
        (false, true, 4, 1),
        (true, false, 1, 4000),
        (true, true, 4, 4000),
    ];
    for (latency, multicore, workers, capacity) in cases {
        let space = Space::<Fibonacci>::new(GridConfig::development()).unwrap();
        space.set_latency_optimization(latency);
        space.set_multicore_optimization(multicore);

        let config = GridConfig {
            processors: 4,
            ..GridConfig::development()
        };
        let computer = Computer::connect(space.handle(), config).await.unwrap();
        assert_eq!(computer.worker_count(), workers, "latency={} multicore={}", latency, multicore);
        assert_eq!(computer.task_queue_max_size().await.unwrap(), capacity);
        assert_eq!(space.proxy(computer.id()).unwrap().capacity(), capacity);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_latency_mode_attaches_local_computer() {
    init_tracing();
    let config = GridConfig {
        latency_optimization: true,
        ..GridConfig::development()
    };
    let space = Space::<Fibonacci>::start(config).await.unwrap();

    let value = tokio::time::timeout(LIMIT, space.submit(Fibonacci::new(9), ()))
        .await
        .expect("fib(9) timed out")
        .unwrap();
    assert_eq!(value, Some(34));

    let computers = space.computers();
    assert_eq!(computers.len(), 1);
    assert!(computers[0].as_str().starts_with("space_"));

    // the second submission reuses the attached computer
    assert_eq!(space.submit(Fibonacci::new(6), ()).await.unwrap(), Some(8));
    assert_eq!(space.computers(), computers);

    space.shutdown().await;
}

#[tokio::test]
async fn test_submit_fails_fast_without_computers() {
    init_tracing();
    let space = Space::<Fibonacci>::start(GridConfig::development()).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), space.submit(Fibonacci::new(3), ()))
        .await
        .expect("submission blocked");
    assert!(matches!(result, Err(GridError::NoComputers)));
    space.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_rejects_new_work() {
    init_tracing();
    let space = Space::<Fibonacci>::start(GridConfig::development()).await.unwrap();
    space.shutdown().await;
    assert!(matches!(
        space.submit(Fibonacci::new(3), ()).await,
        Err(GridError::ShuttingDown)
    ));
}
