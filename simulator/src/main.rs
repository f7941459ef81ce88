mod flame_graph;
mod simulation;

use log::{debug, error, info, warn};
use std::env;
use std::error::Error;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use config::Config;
use mpc::Controller;
use prelude::*;
use simulation::{Plant, SinePath};
use vehicle_model::reference::to_vehicle_frame;
use vehicle_model::{Actuation, Coefficients, KinematicBicycle, State};

fn main() {
    env_logger::init();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| config::CONFIG_FILE.to_owned());
    let config = match config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        error!("simulation failed: {}", e);
        process::exit(1);
    }

    if let Some(path) = &config.simulator.flame_graph {
        if let Err(e) = flame_graph::write_flame(path) {
            error!("unable to write flame graph to {}: {}", path.display(), e);
        }
    }
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let sim = &config.simulator;
    let degree = config.controller.polynomial_degree;

    let mut controller = Controller::new(config.controller.clone())?;
    // Used to advance measurements over the actuator latency
    let model = KinematicBicycle::new(config.controller.lf, config.controller.path_heading_correction)?;

    let path = SinePath::new(&sim.path);
    let mut plant = Plant::new(
        config.controller.lf,
        0.0,
        path.y(0.0) + sim.initial_offset,
        path.heading(0.0),
        sim.initial_speed,
    )?;

    let period = sim.control_period;
    let latency = min(sim.latency, period);
    let period_duration = Duration::from_secs_f64(period);
    let n_steps = (sim.duration / period).round() as usize;

    let mut solve_stats = stats::OnlineStats::new();
    let mut cte_stats = stats::OnlineStats::new();
    let mut degraded = 0;
    let mut applied = Actuation::NEUTRAL;

    for i in 0..n_steps {
        let step_start = Instant::now();
        let pose = *plant.state();

        let waypoints = path.waypoints(pose.x, sim.path.waypoints, sim.path.waypoint_spacing);
        let (xs, ys): (Vec<float>, Vec<float>) = to_vehicle_frame(&waypoints, pose.x, pose.y, pose.psi)
            .into_iter()
            .unzip();
        let coeffs = match Coefficients::fit(&xs, &ys, degree) {
            Ok(coeffs) => coeffs,
            Err(e) => {
                warn!("skipping cycle {}: {}", i, e);
                plant.advance(&applied, period);
                continue;
            }
        };

        // The vehicle frame puts the vehicle at the origin facing along x
        let measured = State::on_path(0.0, 0.0, 0.0, pose.v, &coeffs);
        let predicted = model.predict(&measured, &applied, latency, &coeffs);

        let solve_start = Instant::now();
        let output = controller.solve(&predicted, &coeffs);
        let solve_millis = solve_start.elapsed().as_secs_f64() * 1e3;
        solve_stats.add(solve_millis);
        if !output.status.is_solved() {
            degraded += 1;
        }

        // The previous command stays active until the new one arrives
        plant.advance(&applied, latency);
        applied = output.actuation;
        plant.advance(&applied, period - latency);

        let pose = plant.state();
        let cte = pose.y - path.y(pose.x);
        cte_stats.add(cte.abs());

        info!(
            "t = {:.2} s: cte = {:.3} m, v = {:.2} m/s, delta = {:.3}, a = {:.3}, solve = {:.1} ms",
            (i + 1) as float * period,
            cte,
            pose.v,
            applied.delta,
            applied.a,
            solve_millis
        );
        if let Some(trajectory) = &output.trajectory {
            debug!("predicted positions {:?}", trajectory.positions());
        }
        if let Some(cost) = &output.cost {
            debug!("predicted cost {:?}", cost);
        }

        let step_elapsed = step_start.elapsed();
        if let Some(step_remaining) = period_duration.checked_sub(step_elapsed) {
            if sim.real_time {
                thread::sleep(step_remaining);
            }
        } else {
            println!(
                "step missed deadline. took {:.1}ms.",
                step_elapsed.as_secs_f64() * 1e3
            );
        }
    }

    println!("Solve time stats (mean/ms, stdev/ms): {:?}", solve_stats);
    println!("Absolute cross-track error stats (mean/m, stdev/m): {:?}", cte_stats);
    println!("{} of {} cycles degraded", degraded, n_steps);
    Ok(())
}
