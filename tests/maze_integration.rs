//! End-to-end run through a three-cell corridor: fuse synthetic
//! sensor data while driving east, commit the walls of each cell,
//! then plan paths over the resulting map.

use vyuha_nav::config::{FusionConfig, MazeConfig, MechanicsConfig, SolverConfig};
use vyuha_nav::core::types::{
    cell_state, connections, DistSensorStates, DistSensorStatus, Distances,
};
use vyuha_nav::map::store::REQUIRED_CAPACITY;
use vyuha_nav::map::{exploration_complete, MazeStore, MemoryTransport, WallDetector, WallScan};
use vyuha_nav::solver::find_shortest_path;
use vyuha_nav::{AbsoluteDir, MapCoordinate, SensorFusion, SensorInputs, Vec3, WheelSpeeds, HOME};

const DT: f32 = 0.05;
const SPEED: f32 = 10.0;

/// Side beams see the corridor walls at 60 mm; the front beams see
/// nothing until the robot faces the wall at the corridor's end.
fn corridor_readings(front_wall: bool) -> (Distances, DistSensorStates) {
    let mut distances = Distances::default();
    let mut states = DistSensorStates::default();
    states.left_front = DistSensorStatus::Ok;
    states.left_back = DistSensorStatus::Ok;
    states.right_front = DistSensorStatus::Ok;
    states.right_back = DistSensorStatus::Ok;
    distances.left_front = 60;
    distances.left_back = 60;
    distances.right_front = 60;
    distances.right_back = 60;
    if front_wall {
        states.front_left = DistSensorStatus::Ok;
        states.front_right = DistSensorStatus::Ok;
        distances.front_left = 80;
        distances.front_right = 80;
    } else {
        states.front_left = DistSensorStatus::Overflow;
        states.front_right = DistSensorStatus::Overflow;
    }
    (distances, states)
}

fn deterministic_fusion() -> SensorFusion {
    let mut config = FusionConfig::default();
    config.pitch_iir_factor = 1.0;
    config.speed_iir_factor = 1.0;
    config.predicted_portion = 0.0;
    SensorFusion::new(MechanicsConfig::default(), config, 30.0)
}

#[test]
fn test_drive_commit_and_solve() {
    let mut fusion = deterministic_fusion();
    let mut detector = WallDetector::new(MazeConfig::default());
    let mut store = MazeStore::new(MemoryTransport::new(REQUIRED_CAPACITY)).unwrap();
    let maze_config = MazeConfig::default();

    let mut travel = 0.0f32;
    let mut run_cycle = |fusion: &mut SensorFusion,
                         detector: &mut WallDetector,
                         store: &mut MazeStore<MemoryTransport>,
                         moving: bool,
                         front_wall: bool| {
        let (distances, states) = corridor_readings(front_wall);
        if moving {
            travel += SPEED * DT;
        }
        let inputs = SensorInputs {
            dt: DT,
            wheel_speeds: if moving {
                WheelSpeeds::new(SPEED, SPEED)
            } else {
                WheelSpeeds::default()
            },
            wheel_travel: (travel, travel),
            inertial_forward: Vec3::new(1.0, 0.0, 0.0),
            distances,
            dist_sensor_states: states,
            driving_straight: moving,
        };
        if let Some(outcome) = fusion.update(&inputs, None) {
            if outcome.cell_changed {
                detector.reset_cell_record();
            }
            let scan = WallScan::from_beams(&outcome.fused, &maze_config);
            let result = detector.evaluate(scan, &outcome.fused, store).unwrap();
            fusion.set_grid_cell(result.cell, if result.committed { 1.0 } else { 0.5 });
        }
    };

    // Drive 6 s east through cells (0,0), (1,0), (2,0)
    for _ in 0..121 {
        run_cycle(&mut fusion, &mut detector, &mut store, true, false);
    }
    assert_eq!(
        fusion.fused().robot_state.map_coordinate,
        MapCoordinate::new(2, 0)
    );
    assert_eq!(fusion.fused().robot_state.heading, AbsoluteDir::East);

    // Stand still at the end of the corridor facing its closing wall
    for _ in 0..15 {
        run_cycle(&mut fusion, &mut detector, &mut store, false, true);
    }

    // All three cells committed with the corridor geometry
    let home = store.get_cell(HOME).unwrap();
    assert!(home.is_visited());
    assert_eq!(
        home.connections & connections::DIRECTION_MASK,
        connections::EAST | connections::WEST
    );

    let middle = store.get_cell(MapCoordinate::new(1, 0)).unwrap();
    assert!(middle.is_visited());
    assert_eq!(
        middle.connections & connections::DIRECTION_MASK,
        connections::EAST | connections::WEST
    );

    let end = store.get_cell(MapCoordinate::new(2, 0)).unwrap();
    assert!(end.is_visited());
    assert_eq!(
        end.connections & connections::DIRECTION_MASK,
        connections::WEST
    );

    // The corridor is fully explored
    assert!(exploration_complete(
        &mut store,
        MapCoordinate::new(0, 0),
        MapCoordinate::new(2, 0)
    )
    .unwrap());

    // Plan back home and out again over the committed map
    let solver_config = SolverConfig::default();
    let back = find_shortest_path(&mut store, MapCoordinate::new(2, 0), &solver_config, |coor, _| {
        coor == HOME
    })
    .unwrap();
    assert_eq!(back, vec![AbsoluteDir::West, AbsoluteDir::West]);

    let out = find_shortest_path(&mut store, HOME, &solver_config, |_, cell| {
        cell.state & cell_state::VISITED != 0 && cell.connections == connections::WEST
    })
    .unwrap();
    assert_eq!(out, vec![AbsoluteDir::East, AbsoluteDir::East]);
}

#[test]
fn test_recalibration_recenter_feeds_next_cycle() {
    // Robot drifted 3 cm toward the left wall; a standstill
    // recalibration pins it back to the corridor center line.
    struct Source;
    impl vyuha_nav::SensorSource for Source {
        fn sample_distances(&mut self) -> (Distances, DistSensorStates) {
            let mut distances = Distances::default();
            let mut states = DistSensorStates::default();
            states.left_front = DistSensorStatus::Ok;
            states.left_back = DistSensorStatus::Ok;
            states.right_front = DistSensorStatus::Ok;
            states.right_back = DistSensorStatus::Ok;
            // 3 cm closer to the left wall than to the right
            distances.left_front = 30;
            distances.left_back = 30;
            distances.right_front = 90;
            distances.right_back = 90;
            (distances, states)
        }
        fn wheel_travel(&mut self) -> (f32, f32) {
            (0.0, 0.0)
        }
    }

    let mut fusion = deterministic_fusion();
    // Burn the first-cycle skip
    let idle = SensorInputs {
        dt: DT,
        wheel_speeds: WheelSpeeds::default(),
        wheel_travel: (0.0, 0.0),
        inertial_forward: Vec3::new(1.0, 0.0, 0.0),
        distances: Distances::default(),
        dist_sensor_states: DistSensorStates::default(),
        driving_straight: false,
    };
    assert!(fusion.update(&idle, None).is_none());

    let request = fusion.recalibrate(&mut Source);
    // Left wall (north) at 3 + 6 = 9 cm gives y = 15 - 9 = 6; right
    // wall at 9 + 6 = 15 cm gives y = -15 + 15 = 0; averaged y = 3.
    let y = request.y.expect("recalibration found no side walls");
    assert!((y - 3.0).abs() < 1e-3, "unexpected y correction {}", y);

    let outcome = fusion.update(&idle, Some(request)).unwrap();
    assert!((outcome.fused.robot_state.position.y - 3.0).abs() < 1e-3);
    assert_eq!(outcome.fused.robot_state.pitch, 0.0);
}
