//! End-to-end tests for the NBLAST pipeline.

use std::num::NonZeroUsize;

use ndarray::Array2;
use neurite_core::{ScoreMatrix, ScoreTable, VectorCloud};
use rstest::{fixture, rstest};
use tracing_subscriber::layer::SubscriberExt;

use neurite_test_support::tracing::RecordingLayer;

/// A table rewarding proximity (low rows) and alignment (high columns),
/// strictly positive everywhere so self-scores never vanish.
#[fixture]
fn table() -> ScoreTable {
    let matrix = Array2::from_shape_fn((21, 10), |(row, column)| {
        ((21 - row) * (column + 1)) as f32
    });
    ScoreTable::new(matrix).expect("21x10 matrix is the expected shape")
}

fn line(n: usize, spacing: f32, along: usize, offset: [f32; 3]) -> Array2<f32> {
    Array2::from_shape_fn((n, 3), |(i, c)| {
        let base = offset[c];
        if c == along { base + i as f32 * spacing } else { base }
    })
}

fn cloud(points: Array2<f32>) -> VectorCloud {
    VectorCloud::with_neighbours(points.view(), NonZeroUsize::new(6).expect("non-zero"))
        .expect("synthetic neurons are non-empty")
}

#[rstest]
fn close_parallel_neurons_outscore_distant_orthogonal_ones(table: ScoreTable) {
    // Neuron 1 runs parallel to neuron 0 at 200 nm; neuron 2 is far away
    // and orthogonal.
    let clouds = vec![
        cloud(line(40, 500.0, 0, [0.0, 0.0, 0.0])),
        cloud(line(40, 500.0, 0, [0.0, 200.0, 0.0])),
        cloud(line(40, 500.0, 1, [30_000.0, 0.0, 0.0])),
    ];
    let matrix = ScoreMatrix::new(&clouds, &table).expect("non-empty cloud set");

    let raw = matrix.raw();
    for query in 0..3 {
        assert!(raw[[query, query]] > 0.0, "self-scores must be positive");
    }

    let mean = matrix.mean();
    assert!(
        mean[[0, 1]] > mean[[0, 2]],
        "close parallel pair must outscore the distant orthogonal pair",
    );
    for target in 0..3 {
        for query in 0..3 {
            assert_eq!(mean[[target, query]], mean[[query, target]]);
        }
    }
}

#[rstest]
fn score_matrix_records_cloud_count_telemetry(table: ScoreTable) {
    let layer = RecordingLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());

    tracing::subscriber::with_default(subscriber, || {
        let clouds = vec![
            cloud(line(12, 800.0, 0, [0.0, 0.0, 0.0])),
            cloud(line(12, 800.0, 2, [0.0, 0.0, 0.0])),
        ];
        let matrix = ScoreMatrix::new(&clouds, &table).expect("non-empty cloud set");
        assert_eq!(matrix.cloud_count(), 2);
    });

    let spans = layer.spans();
    let cloud_spans: Vec<_> = spans
        .iter()
        .filter(|span| span.name == "nblast.vector_cloud")
        .collect();
    assert_eq!(cloud_spans.len(), 2);
    for span in cloud_spans {
        assert_eq!(span.fields.get("points"), Some(&"12".to_owned()));
        assert_eq!(span.fields.get("k"), Some(&"6".to_owned()));
    }

    let matrix_span = spans
        .iter()
        .find(|span| span.name == "nblast.score_matrix")
        .expect("score matrix span must exist");
    assert_eq!(matrix_span.fields.get("clouds"), Some(&"2".to_owned()));
}
