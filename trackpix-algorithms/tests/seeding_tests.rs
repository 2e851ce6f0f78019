#![allow(clippy::float_cmp, clippy::cast_precision_loss)]

mod common;

use std::collections::{BTreeSet, HashMap};

use approx::assert_relative_eq;
use trackpix_algorithms::{
    ChainConfig, CollinearPolicy, GridConfig, SeedFilterConfig, SeedFinder, SeedFinderConfig,
    SeedingChain, SpacepointGrid, TripletBuffer,
};
use trackpix_core::{Execution, MeasurementLink, SeedingError, Spacepoint};
use trackpix_detector::{Detector, GenericBarrel};

/// Spacepoints of a simulated event with `n` tracks.
fn simulated_spacepoints(n: usize, seed: u64) -> Vec<Spacepoint> {
    let barrel = GenericBarrel::default();
    let detector = Detector::default();
    let event = common::simulate(&barrel, &detector, &common::tracks(n, seed));
    let chain = SeedingChain::new(ChainConfig::default()).unwrap();
    chain
        .process_event(&event.cells, &detector, &detector)
        .unwrap()
        .spacepoints
}

fn triplets(finder: &SeedFinder, spacepoints: &[Spacepoint], grid: &SpacepointGrid) -> BTreeSet<[usize; 3]> {
    finder
        .find_seeds(spacepoints, grid)
        .unwrap()
        .seeds
        .iter()
        .map(|s| s.spacepoints())
        .collect()
}

/// Finder and filter keeping every triplet that passes the cuts.
fn keep_everything() -> (SeedFinderConfig, SeedFilterConfig) {
    let finder = SeedFinderConfig {
        max_seeds_per_middle: 200,
        max_compatible_per_middle: 100_000,
        ..SeedFinderConfig::default()
    };
    let filter = SeedFilterConfig {
        seed_cut_r: 1e9,
        ..SeedFilterConfig::default()
    }
    .with_dedup_cot_theta(0.0)
    .with_max_seeds_per_event(usize::MAX);
    (finder, filter)
}

#[test]
fn test_sequential_matches_parallel() {
    let spacepoints = simulated_spacepoints(40, 1);
    assert!(spacepoints.len() > 100);
    let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Parallel).unwrap();

    let parallel = SeedFinder::new(SeedFinderConfig::default(), SeedFilterConfig::default()).unwrap();
    let sequential = SeedFinder::new(
        SeedFinderConfig::default().with_execution(Execution::Sequential),
        SeedFilterConfig::default(),
    )
    .unwrap();

    let a = parallel.find_seeds(&spacepoints, &grid).unwrap();
    let b = sequential.find_seeds(&spacepoints, &grid).unwrap();
    assert!(!a.seeds.is_empty());
    assert_eq!(a, b);

    // Repeated parallel runs agree as well.
    for _ in 0..3 {
        assert_eq!(parallel.find_seeds(&spacepoints, &grid).unwrap(), a);
    }
}

#[test]
fn test_seeds_sorted_by_weight() {
    let spacepoints = simulated_spacepoints(20, 2);
    let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Parallel).unwrap();
    let finder = SeedFinder::new(SeedFinderConfig::default(), SeedFilterConfig::default()).unwrap();
    let seeds = finder.find_seeds(&spacepoints, &grid).unwrap().seeds;

    assert!(seeds.windows(2).all(|w| w[0].weight >= w[1].weight));
    for seed in &seeds {
        let [b, m, t] = seed.spacepoints();
        assert!(spacepoints[b].r() < spacepoints[m].r());
        assert!(spacepoints[m].r() < spacepoints[t].r());
    }
}

#[test]
fn test_tighter_cuts_never_add_seeds() {
    let spacepoints = simulated_spacepoints(30, 3);
    let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Parallel).unwrap();
    let (loose, filter) = keep_everything();
    let loose_set = triplets(&SeedFinder::new(loose.clone(), filter.clone()).unwrap(), &spacepoints, &grid);
    assert!(!loose_set.is_empty());

    let tightened = [
        SeedFinderConfig {
            impact_max: 1.0,
            ..loose.clone()
        },
        SeedFinderConfig {
            min_pt: 1.5,
            ..loose.clone()
        },
        SeedFinderConfig {
            sigma_scattering: 1.0,
            ..loose.clone()
        },
        SeedFinderConfig {
            cot_theta_max: 0.5,
            collision_region_min: -20.0,
            collision_region_max: 20.0,
            ..loose.clone()
        },
        SeedFinderConfig {
            delta_r_max: 60.0,
            ..loose
        },
    ];
    for config in tightened {
        let tight_set = triplets(&SeedFinder::new(config, filter.clone()).unwrap(), &spacepoints, &grid);
        assert!(tight_set.is_subset(&loose_set));
    }
}

#[test]
fn test_per_middle_limit() {
    let spacepoints = simulated_spacepoints(30, 4);
    let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Parallel).unwrap();
    let (mut config, filter) = keep_everything();
    config.max_seeds_per_middle = 1;
    let seeds = SeedFinder::new(config, filter)
        .unwrap()
        .find_seeds(&spacepoints, &grid)
        .unwrap()
        .seeds;

    let mut per_middle: HashMap<usize, usize> = HashMap::new();
    for seed in &seeds {
        *per_middle.entry(seed.middle).or_default() += 1;
    }
    assert!(!per_middle.is_empty());
    assert!(per_middle.values().all(|&count| count == 1));
}

#[test]
fn test_per_event_limit_keeps_best_seeds() {
    let spacepoints = simulated_spacepoints(30, 5);
    let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Parallel).unwrap();

    let all = SeedFinder::new(SeedFinderConfig::default(), SeedFilterConfig::default())
        .unwrap()
        .find_seeds(&spacepoints, &grid)
        .unwrap();
    assert!(all.seeds.len() > 3);

    let limited = SeedFinder::new(
        SeedFinderConfig::default(),
        SeedFilterConfig::default().with_max_seeds_per_event(3),
    )
    .unwrap()
    .find_seeds(&spacepoints, &grid)
    .unwrap();
    assert_eq!(limited.seeds, all.seeds[..3]);
    assert_eq!(limited.stats.truncated_seeds, all.seeds.len() - 3);
}

#[test]
fn test_buffer_refuses_overflow() {
    let buffer = TripletBuffer::with_capacity(4);
    buffer.push_all(vec![1, 2, 3]).unwrap();
    let err = buffer.push_all(vec![4, 5]).unwrap_err();
    assert_eq!(
        err,
        SeedingError::BufferOverflow {
            capacity: 4,
            requested: 5
        }
    );
    assert!(buffer.overflowed());
    assert_eq!(buffer.into_vec(), vec![1, 2, 3]);
}

#[test]
fn test_grid_larger_than_collection() {
    let spacepoints = simulated_spacepoints(5, 6);
    let grid = SpacepointGrid::build(&GridConfig::default(), &spacepoints, Execution::Sequential).unwrap();
    let finder = SeedFinder::new(SeedFinderConfig::default(), SeedFilterConfig::default()).unwrap();
    assert!(finder.find_seeds(&spacepoints[..2], &grid).is_err());
}

fn collinear() -> Vec<Spacepoint> {
    [30.0, 60.0, 90.0]
        .into_iter()
        .enumerate()
        .map(|(i, x)| Spacepoint::new([x, 0.0, 0.0], 1e-4, 1e-4, MeasurementLink::Single(i)))
        .collect()
}

#[test]
fn test_collinear_accepted_at_ceiling() {
    let chain = SeedingChain::new(ChainConfig::default().with_b_field(0.0)).unwrap();
    let output = chain.process_spacepoints(collinear()).unwrap();

    assert_eq!(output.seeds.len(), 1);
    assert_eq!(output.seeds[0].spacepoints(), [0, 1, 2]);
    assert_eq!(output.stats.momentum_at_ceiling, 1);

    let params = &output.track_params[0];
    assert!(params.momentum_at_ceiling);
    assert!(!params.has_non_finite());
    assert_relative_eq!(params.momentum(), chain.config().track_params.pt_ceiling, max_relative = 1e-9);
    assert_relative_eq!(params.theta(), std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
    assert_relative_eq!(params.phi(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_collinear_rejected_by_policy() {
    let mut config = ChainConfig::default().with_b_field(0.0);
    config.finder = config.finder.with_collinear_policy(CollinearPolicy::Reject);
    let chain = SeedingChain::new(config).unwrap();
    let output = chain.process_spacepoints(collinear()).unwrap();
    assert!(output.seeds.is_empty());
    assert!(output.track_params.is_empty());
}

#[test]
fn test_collinear_in_field_is_accepted() {
    // A straight line in a field has infinite radius and is clipped to the
    // ceiling.
    let chain = SeedingChain::new(ChainConfig::default()).unwrap();
    let output = chain.process_spacepoints(collinear()).unwrap();
    assert_eq!(output.seeds.len(), 1);
    assert!(output.track_params[0].momentum_at_ceiling);
}
