use courtmap::geo::Coordinate;
use courtmap::map::canvas::{CanvasId, MapCanvas, SurfaceSize};
use courtmap::map::markers::MarkerReconciler;
use courtmap::map::renderer::{LabelPlace, LineLayer, Lod, MapRenderer};
use courtmap::map::tiles::TileLayerKind;
use courtmap::map::Viewport;
use courtmap::venue::{Access, Activity, Setting, Venue, VenueId, VenueSnapshot};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::rc::Rc;

const AUSTIN: Coordinate = Coordinate::new(30.2672, -97.7431);

fn venues(count: usize, offset: usize) -> Vec<Venue> {
    (offset..offset + count)
        .map(|i| {
            let activity = Activity::ALL[i % Activity::ALL.len()];
            Venue {
                id: VenueId(format!("v{i}")),
                name: format!("Venue {i}"),
                address: String::new(),
                coordinate: Coordinate::new(
                    AUSTIN.lat + (i % 40) as f64 * 0.002,
                    AUSTIN.lng + (i / 40) as f64 * 0.002,
                ),
                setting: Setting::Outdoor,
                lighting: i % 2 == 0,
                access: Access::Public,
                courts: [(activity, 1 + (i % 3) as u32)].into_iter().collect(),
                created_by: None,
            }
        })
        .collect()
}

fn canvas() -> MapCanvas {
    MapCanvas::new(CanvasId(1), "map", SurfaceSize::new(160, 48), AUSTIN, 13.0)
        .expect("valid canvas")
}

fn bench_reconcile(c: &mut Criterion) {
    let a: VenueSnapshot = Rc::from(venues(1000, 0));
    // Half the venues replaced
    let b: VenueSnapshot = Rc::from(venues(1000, 500));

    c.bench_function("reconcile_1000_half_changed", |bench| {
        let mut canvas = canvas();
        let mut reconciler = MarkerReconciler::new();
        bench.iter(|| {
            black_box(reconciler.sync(&mut canvas, &a, None, None));
            black_box(reconciler.sync(&mut canvas, &b, None, None));
        })
    });

    c.bench_function("reconcile_filter_toggle", |bench| {
        let mut canvas = canvas();
        let mut reconciler = MarkerReconciler::new();
        bench.iter(|| {
            black_box(reconciler.sync(&mut canvas, &a, Some(Activity::Tennis), None));
            black_box(reconciler.sync(&mut canvas, &a, None, None));
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let mut renderer = MapRenderer::new();
    // Concentric rings of line work around the view
    for ring in 0..200 {
        let radius = 0.01 + ring as f64 * 0.01;
        let line = (0..=64)
            .map(|step| {
                let angle = step as f64 / 64.0 * std::f64::consts::TAU;
                Coordinate::new(AUSTIN.lat + radius * angle.sin(), AUSTIN.lng + radius * angle.cos())
            })
            .collect();
        let layer = match ring % 4 {
            0 => LineLayer::Coastline(Lod::High),
            1 => LineLayer::Border,
            2 => LineLayer::State,
            _ => LineLayer::Road,
        };
        renderer.add_line(layer, line);
    }
    for i in 0..500 {
        renderer.add_place(LabelPlace {
            coordinate: Coordinate::new(AUSTIN.lat + (i % 25) as f64 * 0.05, AUSTIN.lng + (i / 25) as f64 * 0.05),
            name: format!("Place {i}"),
            population: 10_000 * i as u64,
        });
    }

    let viewport = Viewport::new(AUSTIN, 10.0, 320, 192);
    c.bench_function("render_street_z10", |bench| {
        bench.iter(|| black_box(renderer.render(160, 48, &viewport, TileLayerKind::Street)))
    });
    c.bench_function("render_satellite_z10", |bench| {
        bench.iter(|| black_box(renderer.render(160, 48, &viewport, TileLayerKind::Satellite)))
    });
}

criterion_group!(benches, bench_reconcile, bench_render);
criterion_main!(benches);
