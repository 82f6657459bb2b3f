use anyhow::Context as _;
use anyhow::Result;
use hyperpart::Partition as _;

use std::env;
use std::fs;
use std::io;

const USAGE: &str = "Usage: hgr-part -h <file> -k <blocks> [options]";

fn parse_bool(arg: Option<String>, default: bool) -> Result<bool> {
    match arg.as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut options = getopts::Options::new();
    options.optflag("", "help", "print this help menu");
    options.optopt("h", "hypergraph", "input hypergraph file", "FILE");
    options.optopt("o", "objective", "objective function: cut or km1", "OBJ");
    options.optopt("k", "blocks", "number of blocks, at least 2", "INT");
    options.optopt("e", "epsilon", "imbalance tolerance, positive", "FLOAT");
    options.optopt("t", "threads", "number of threads", "INT");
    options.optopt("", "seed", "seed for random operations", "INT");
    options.optopt("", "write-partition", "emit the partition file", "BOOL");
    options.optopt("", "partition-output", "partition file destination", "PATH");
    options.optopt(
        "",
        "r-lp",
        "label propagation refiner: do_nothing, cut or km1",
        "ALGO",
    );
    options.optopt(
        "",
        "r-fm",
        "FM refiner: do_nothing, multitry or boundary",
        "ALGO",
    );
    options.optopt(
        "",
        "r-flow",
        "flow scheduler: do_nothing, opt or match",
        "ALGO",
    );
    options.optopt("", "deterministic", "reproducible runs", "BOOL");

    let matches = options.parse(env::args().skip(1))?;
    if matches.opt_present("help") {
        eprintln!("{}", options.usage(USAGE));
        return Ok(());
    }

    let hypergraph_file = matches
        .opt_str("h")
        .context("missing required option 'hypergraph'")?;
    let k: i32 = matches
        .opt_str("k")
        .context("missing required option 'blocks'")?
        .parse()
        .context("invalid block count")?;
    let epsilon: f64 = match matches.opt_str("e") {
        Some(e) => e.parse().context("invalid imbalance tolerance")?,
        None => 0.03,
    };
    anyhow::ensure!(epsilon > 0.0, "imbalance tolerance must be positive");
    let objective = matches
        .opt_str("o")
        .unwrap_or_else(|| "km1".to_string())
        .parse::<hyperpart::Objective>()?;

    let mut context = hyperpart::Context::new(k, epsilon, objective);
    if let Some(seed) = matches.opt_str("seed") {
        context.seed = seed.parse().context("invalid seed")?;
    }
    context.deterministic = parse_bool(matches.opt_str("deterministic"), false)?;
    if let Some(algo) = matches.opt_str("r-lp") {
        context.lp.algorithm = algo.parse()?;
    }
    if let Some(algo) = matches.opt_str("r-fm") {
        context.fm.algorithm = algo.parse()?;
    }
    if let Some(algo) = matches.opt_str("r-flow") {
        context.flow.algorithm = algo.parse()?;
    }

    let file = fs::File::open(&hypergraph_file)
        .with_context(|| format!("failed to open {hypergraph_file:?}"))?;
    let file = hgr_io::hmetis::read(io::BufReader::new(file))
        .context("failed to read hypergraph file")?;
    let hypergraph = hyperpart::hypergraph::HypergraphBuilder::new(file.num_nodes)
        .add_edges(file.edges)
        .node_weights(file.node_weights)
        .build()?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = matches.opt_str("t") {
        pool = pool.num_threads(threads.parse().context("invalid thread count")?);
    }
    let pool = pool.build().context("failed to build thread pool")?;

    let mut partition = vec![-1; hypergraph.num_nodes()];
    let metadata = pool.install(|| {
        hyperpart::Multilevel { context }.partition(&mut partition, &hypergraph)
    })?;

    println!("objective      = {}", metadata.objective);
    println!("imbalance      = {:.4}", metadata.imbalance);
    println!("levels         = {}", metadata.level_count);

    if parse_bool(matches.opt_str("write-partition"), false)? {
        let path = matches
            .opt_str("partition-output")
            .unwrap_or_else(|| format!("{hypergraph_file}.part{k}"));
        let out = fs::File::create(&path).with_context(|| format!("failed to create {path:?}"))?;
        let out = io::BufWriter::new(out);
        hgr_io::partition::write(out, partition.iter().copied())
            .context("failed to write partition")?;
        println!("partition written to {path}");
    }

    Ok(())
}
