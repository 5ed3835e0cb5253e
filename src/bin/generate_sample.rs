use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Contents of each run's `params.json`.
#[derive(Serialize)]
struct RunParams<'a> {
    env: &'a str,
    seed: u64,
    lr: f64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Noisy exponential decay towards `floor`, faster for larger learning rates.
fn loss_curve(steps: usize, lr: f64, floor: f64, rng: &mut SimpleRng) -> Vec<f64> {
    let rate = lr * 2.0;
    (0..steps)
        .map(|step| {
            let clean = floor + (2.5 - floor) * (-rate * step as f64).exp();
            (clean + rng.gauss(0.0, 0.08)).max(0.0)
        })
        .collect()
}

fn write_run(dir: &Path, params: &RunParams<'_>, losses: &[f64]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut writer = csv::Writer::from_path(dir.join("loss.csv"))?;
    writer.write_record(["step", "loss"])?;
    for (step, loss) in losses.iter().enumerate() {
        writer.write_record([step.to_string(), loss.to_string()])?;
    }
    writer.flush()?;

    let json = serde_json::to_string_pretty(params)?;
    fs::write(dir.join("params.json"), json)?;
    Ok(())
}

fn main() -> Result<()> {
    let output_dir = Path::new("results/sample");
    let steps = 5_000;

    let envs = [
        ("PongNoFrameskip-v4", 0.4),
        ("BreakoutNoFrameskip-v4", 0.7),
        ("SeaquestNoFrameskip-v4", 1.1),
    ];
    let learning_rates = [0.0001, 0.0005];
    let seeds = [1u64, 2, 3];

    let mut runs = 0;
    for &(env, floor) in &envs {
        for &lr in &learning_rates {
            for &seed in &seeds {
                let mut rng = SimpleRng::new(seed * 1_000 + runs);
                let losses = loss_curve(steps, lr, floor, &mut rng);
                let params = RunParams { env, seed, lr };
                let run_dir = output_dir.join(format!("{env}_lr{lr}_seed{seed}"));
                write_run(&run_dir, &params, &losses)?;
                runs += 1;
            }
        }
    }

    println!(
        "Wrote {runs} runs ({steps} steps each) to {}",
        output_dir.display()
    );
    println!("Try: plot-loss --results-dir {} --create-csv --hue lr", output_dir.display());
    Ok(())
}
