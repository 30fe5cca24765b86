use codspeed_criterion_compat::{black_box, criterion_group, criterion_main, Criterion};
use padmux_workspace::parse_settings;

fn bench_parse_settings(c: &mut Criterion) {
    let yaml: &str = include_str!("../../../padmux.example.yaml");

    c.bench_function("workspace_parse_settings_example", |b| {
        b.iter(|| {
            let input = black_box(yaml);
            let settings = parse_settings(input).expect("settings should parse");
            black_box(settings);
        })
    });
}

criterion_group!(benches, bench_parse_settings);
criterion_main!(benches);
