use criterion::*;
use std::hint::black_box;
use satnet_bpa::{
    bundle::Bundle,
    neighbors::Neighbor,
    routing::{Router, energy::EnergyAwareRouter, static_routes::StaticRouter},
};

fn neighbors(n: usize) -> Vec<Neighbor> {
    (0..n)
        .map(|i| {
            let mut neighbor = Neighbor::new(
                &format!("sat{i:03}"),
                &format!("dtn://sat{i:03}/"),
                (i % 10) as f64 / 10.0,
            );
            if i % 3 == 0 {
                neighbor = neighbor.with_battery(10.0);
            }
            neighbor
        })
        .collect()
}

fn bench(c: &mut Criterion) {
    let bundle = Bundle::create("dtn://ground/", "dtn://mars/hab", vec![0u8; 1024]);
    let energy = EnergyAwareRouter::new(Default::default()).unwrap();
    let fixed = StaticRouter::with_routes([("dtn://mars/", "sat007")]);

    let mut group = c.benchmark_group("select-next-hop");
    for n in [8, 64, 512] {
        let neighbors = neighbors(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("energy", n), &neighbors, |b, ns| {
            b.iter(|| energy.select_next_hop(black_box(&bundle), ns))
        });
        group.bench_with_input(BenchmarkId::new("static", n), &neighbors, |b, ns| {
            b.iter(|| fixed.select_next_hop(black_box(&bundle), ns))
        });
    }
    group.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
