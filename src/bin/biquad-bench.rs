//! Throughput benchmark for the biquad kernels.
//!
//! Runs the reference kernel, the JIT scalar path and the JIT buffer path over the
//! same sine signal and reports throughput and the largest deviation from the
//! reference output.

use biquad_jit::kernel::{probe, KernelSession};
use biquad_jit::{reference, FilterCoefficients, FilterState, JitConfig};
use clap::Parser;
use std::process;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "biquad-bench", version, about = "Benchmark the JIT biquad kernels")]
struct Cli {
    /// Samples per iteration
    #[arg(short, long, default_value_t = 1_000_000)]
    samples: usize,
    /// Iterations per kernel
    #[arg(short, long, default_value_t = 10)]
    iterations: u32,
    /// Period of the test sine, in samples
    #[arg(long, default_value_t = 100.0)]
    period: f64,
    /// Coefficients a0,a1,a2,b1,b2
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values_t = [0.05, 0.10, 0.05, -1.60, 0.80]
    )]
    coefficients: Vec<f64>,
    /// Skip the buffer entry point and process buffers sample by sample
    #[arg(long)]
    no_buffer: bool,
    /// Log the IR before and after lowering and the optimised LLVM module
    #[arg(long)]
    dump_ir: bool,
}

struct Measurement {
    name: &'static str,
    elapsed: Duration,
    output: Vec<f64>,
}

fn run(
    name: &'static str,
    iterations: u32,
    input: &[f64],
    mut kernel: impl FnMut(&mut FilterState, &[f64], &mut [f64]) -> Result<(), String>,
) -> Result<Measurement, String> {
    let mut output = vec![0.0; input.len()];
    let mut elapsed = Duration::ZERO;
    for _ in 0..iterations.max(1) {
        let mut state = FilterState::default();
        let start = Instant::now();
        kernel(&mut state, input, &mut output)?;
        elapsed += start.elapsed();
    }
    Ok(Measurement {
        name,
        elapsed,
        output,
    })
}

fn max_deviation(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let [a0, a1, a2, b1, b2] = match <[f64; 5]>::try_from(cli.coefficients.as_slice()) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("Error: expected 5 coefficients, got {}", cli.coefficients.len());
            process::exit(2);
        }
    };
    let coeffs = FilterCoefficients::new(a0, a1, a2, b1, b2);
    let input: Vec<f64> = (0..cli.samples)
        .map(|i| (2.0 * std::f64::consts::PI * i as f64 / cli.period).sin() * 0.5)
        .collect();

    let availability = probe();
    println!("JIT backend: {}", availability);

    let mut results = Vec::new();
    results.push(run("reference", cli.iterations, &input, |state, input, output| {
        reference::process_buffer(&coeffs, state, input, output);
        Ok(())
    }));

    if availability.is_available() {
        let config = JitConfig::from_env()
            .with_buffer_entry(!cli.no_buffer)
            .with_ir_dump(cli.dump_ir);
        let start = Instant::now();
        match KernelSession::create_with_config(&coeffs, &config) {
            Ok(session) => {
                println!("session created in {:.2?}", start.elapsed());
                results.push(run("jit scalar", cli.iterations, &input, |state, input, output| {
                    for (x, y) in input.iter().zip(output.iter_mut()) {
                        *y = session.process_one(&coeffs, state, *x);
                    }
                    Ok(())
                }));
                let name = if session.has_buffer_kernel() {
                    "jit buffer"
                } else {
                    "jit buffer (fallback)"
                };
                results.push(run(name, cli.iterations, &input, |state, input, output| {
                    session
                        .process_buffer(&coeffs, state, input, output)
                        .map_err(|e| e.to_string())
                }));
                session.destroy();
            }
            Err(e) => eprintln!("Error: kernel session creation failed: {}", e),
        }
    }

    let mut baseline: Option<Vec<f64>> = None;
    for result in results {
        let m = match result {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        };
        let total = cli.samples as f64 * f64::from(cli.iterations.max(1));
        let rate = total / m.elapsed.as_secs_f64().max(f64::EPSILON) / 1e6;
        let deviation = baseline
            .as_deref()
            .map(|b| max_deviation(b, &m.output))
            .unwrap_or(0.0);
        println!(
            "{:<24} {:>10.2?} {:>10.1} Msamples/s  max deviation {:.3e}",
            m.name, m.elapsed, rate, deviation
        );
        if baseline.is_none() {
            baseline = Some(m.output);
        }
    }
}
