use aoi::{Backend, Config, Position, Space};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;

const MAP: Position = [1000.0, 1000.0, 0.0];

fn config(backend: Backend) -> Config {
    match backend {
        Backend::CrossLink => Config::cross_link(MAP, [10.0, 10.0, 0.0]),
        Backend::Grid => Config::grid(MAP, [10.0, 10.0, 0.0]),
    }
}

fn name(backend: Backend, op: &str) -> String {
    match backend {
        Backend::CrossLink => format!("crosslink_{}", op),
        Backend::Grid => format!("grid_{}", op),
    }
}

fn random_pos(rng: &mut StdRng) -> Position {
    [rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0), 0.0]
}

fn populated(backend: Backend, rng: &mut StdRng, count: u32) -> Space<()> {
    let mut space = Space::new(config(backend), ()).unwrap();
    for id in 0..count {
        space.enter_str(id, random_pos(rng), "wm");
    }
    space
}

fn enter_benchmark(c: &mut Criterion) {
    for backend in [Backend::CrossLink, Backend::Grid] {
        let mut rng = StdRng::seed_from_u64(1);
        let mut space = populated(backend, &mut rng, 5000);
        c.bench_function(&name(backend, "enter_leave"), |b| {
            b.iter(|| {
                let id = rng.gen_range(0..5000);
                space.leave(black_box(id));
                space.enter_str(id, random_pos(&mut rng), "wm");
            })
        });
    }
}

fn move_benchmark(c: &mut Criterion) {
    for backend in [Backend::CrossLink, Backend::Grid] {
        let mut rng = StdRng::seed_from_u64(2);
        let mut space = populated(backend, &mut rng, 5000);
        c.bench_function(&name(backend, "move"), |b| {
            b.iter(|| {
                let id = rng.gen_range(0..5000);
                if let Some(entity) = space.entity(id) {
                    let pos = [
                        (entity.pos[0] + rng.gen_range(-5.0f32..5.0)).clamp(0.0, 999.0),
                        (entity.pos[1] + rng.gen_range(-5.0f32..5.0)).clamp(0.0, 999.0),
                        0.0,
                    ];
                    space.move_to(black_box(id), pos);
                }
            })
        });
    }
}

fn query_benchmark(c: &mut Criterion) {
    for backend in [Backend::CrossLink, Backend::Grid] {
        let mut rng = StdRng::seed_from_u64(3);
        let mut space = populated(backend, &mut rng, 5000);
        c.bench_function(&name(backend, "query_by_pos"), |b| {
            b.iter(|| {
                let pos = random_pos(&mut rng);
                black_box(space.query_by_pos(pos, Some([20.0, 20.0, 0.0])).len());
            })
        });
        c.bench_function(&name(backend, "query_by_id"), |b| {
            b.iter(|| {
                let id = rng.gen_range(0..5000);
                black_box(space.query_by_id(id, None).len());
            })
        });
    }
}

criterion_group!(benches, enter_benchmark, move_benchmark, query_benchmark);
criterion_main!(benches);
