use std::fs;

use febrile_dx::data::encoder::FeatureEncoder;
use febrile_dx::data::export::write_table;
use febrile_dx::data::loader::TabularParser;
use febrile_dx::data::model::{field_index, FEATURE_COUNT};
use febrile_dx::data::synthetic::CohortGenerator;
use febrile_dx::inference::classifier::{SoftmaxConfig, SoftmaxRegression};
use febrile_dx::{PipelineConfig, PipelineError, Session, TrainingData};

fn trained_session() -> Session<SoftmaxRegression> {
    let config = PipelineConfig {
        synthetic_samples: 450,
        classifier: SoftmaxConfig {
            epochs: 80,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = Session::new(SoftmaxRegression::new(config.classifier.clone()), config);
    session.train(TrainingData::Synthetic, &mut |_| {}).unwrap();
    session
}

#[test]
fn csv_file_parses_and_encodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.csv");
    fs::write(&path, "age,gender,diagnosis\r\n30,M,dengue\r\n40,,\r\n40,F,malaria\r\n").unwrap();

    let parser = TabularParser::default();
    let (headers, rows) = parser.load_file(&path).unwrap();
    assert_eq!(headers, vec!["age", "gender", "diagnosis"]);
    assert_eq!(rows.len(), 3);

    let ds = FeatureEncoder::default().encode(&headers, &rows).unwrap();
    assert_eq!(ds.row_count, 2);
    assert_eq!(ds.features.len(), ds.row_count);
    assert_eq!(ds.labels.len(), ds.row_count);
    assert!(ds.features.iter().all(|v| v.len() == FEATURE_COUNT));
    let g = field_index("gender").unwrap();
    assert_eq!(ds.features[0][g], 1.0);
    assert_eq!(ds.features[1][g], 0.0);
    assert_eq!(ds.labels, vec![0, 1]);
}

#[test]
fn stray_quote_costs_only_its_own_patient() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.csv");
    fs::write(
        &path,
        "age,gender,diagnosis\n30,\"M,dengue\n40,F,malaria\n50,M,leptospirosis\n",
    )
    .unwrap();

    let (headers, rows) = TabularParser::default().load_file(&path).unwrap();
    let ds = FeatureEncoder::default().encode(&headers, &rows).unwrap();
    assert_eq!(ds.row_count, 2);
    assert_eq!(ds.labels, vec![1, 2]);
}

#[test]
fn xlsx_fixture_encodes_like_csv() {
    let fixture = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/patients.xlsx");
    let (headers, rows) = TabularParser::default().load_file(&fixture).unwrap();
    let ds = FeatureEncoder::default().encode(&headers, &rows).unwrap();
    assert_eq!(ds.row_count, 2);
    assert_eq!(ds.labels, vec![0, 1]);
    let fever = field_index("fever").unwrap();
    assert_eq!(ds.features[0][fever], 1.0);
    assert_eq!(ds.features[1][fever], 0.0);
    assert_eq!(ds.features[0][field_index("age").unwrap()], 30.0);
    assert_eq!(ds.features[0][field_index("residence").unwrap()], 1.0);
}

#[test]
fn header_only_file_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    fs::write(&path, "age,gender\n\n").unwrap();
    let err = TabularParser::default().load_file(&path).unwrap_err();
    assert!(matches!(err, PipelineError::MalformedInput(_)));
}

#[test]
fn predict_file_evaluates_labelled_csv_and_parquet() {
    let session = trained_session();
    let parser = TabularParser::default();
    let dir = tempfile::tempdir().unwrap();
    let table = CohortGenerator::new(2024).generate_table(90);

    for name in ["holdout.csv", "holdout.parquet"] {
        let path = dir.path().join(name);
        write_table(&path, &table).unwrap();

        let result = session.predict_file(&parser, &path).unwrap();
        assert_eq!(result.predictions.len(), 90);
        let cm = result.confusion_matrix.as_ref().unwrap();
        assert_eq!(cm.total(), 90);
        let metrics = result.metrics.as_ref().unwrap();
        assert!(metrics.accuracy > 0.6, "{name}: {metrics}");
        assert!(result
            .predictions
            .iter()
            .all(|p| p.confidence > 0.0 && p.confidence <= 1.0));
    }
}

#[test]
fn training_on_explicit_file_uses_its_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.csv");
    write_table(&path, &CohortGenerator::new(8).generate_table(60)).unwrap();

    let parser = TabularParser::default();
    let (headers, rows) = parser.load_file(&path).unwrap();
    let config = PipelineConfig::default();
    let mut session = Session::new(
        SoftmaxRegression::new(SoftmaxConfig {
            epochs: 5,
            ..Default::default()
        }),
        config,
    );
    let ds = session.encoder().encode(&headers, &rows).unwrap();
    let summary = session.train(TrainingData::Dataset(ds), &mut |_| {}).unwrap();
    assert_eq!(summary.source, "dataset");
    assert_eq!(summary.samples, 60);
    assert_eq!(summary.epochs, 5);
}
