use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use hyperpart::hypergraph::HypergraphBuilder;
use hyperpart::Context;
use hyperpart::Multilevel;
use hyperpart::Objective;
use hyperpart::Partition as _;
use hyperpart::StaticHypergraph;

fn grid_hypergraph(width: u32, height: u32) -> StaticHypergraph {
    let index = |x: u32, y: u32| y * width + x;
    let mut edges = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if x + 1 < width {
                edges.push((1, vec![index(x, y), index(x + 1, y)]));
            }
            if y + 1 < height {
                edges.push((1, vec![index(x, y), index(x, y + 1)]));
            }
        }
    }
    HypergraphBuilder::new((width * height) as usize)
        .add_edges(edges)
        .build()
        .unwrap()
}

pub fn bench(c: &mut Criterion) {
    let hg = grid_hypergraph(100, 100);

    let mut group = c.benchmark_group("partition_grid_100x100");
    for thread_count in [1, 2, 4, 8] {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build()
            .unwrap();
        group.bench_function(thread_count.to_string(), |b| {
            pool.install(|| {
                b.iter(|| {
                    let mut context = Context::new(8, 0.05, Objective::Km1);
                    context.seed = 1;
                    let mut partition = vec![-1; hg.num_nodes()];
                    Multilevel { context }
                        .partition(black_box(&mut partition), black_box(&hg))
                        .unwrap()
                })
            });
        });
    }
    group.finish();

    c.bench_function("contract_grid_100x100", |b| {
        b.iter(|| {
            let mut cluster: Vec<u32> = (0..hg.num_nodes() as u32).map(|v| v / 2).collect();
            hg.contract(black_box(&mut cluster))
        })
    });
}

criterion_group!(benches, bench);
criterion_main!(benches);
