mod common;

use common::{encode_png, mosaic, noise, scratch_dir, table};
use labelmatch::corpus::builder::source_images_in_dir;
use labelmatch::{
    CatalogId, CorpusBuilder, DescriptorExtractor, Engine, EngineConfig, Identification,
    IdentificationService, IdentifyError, MatchScheduler, NoMatchReason, SourceImage,
};
use std::time::Duration;

const CATALOG: &str = "id,name,region,image_url\n\
                       11,Glen Alpha,Speyside,http://img/11.jpg\n\
                       12,Glen Beta,Islay,http://img/12.jpg\n\
                       13,Glen Gamma,Highland,http://img/13.jpg\n\
                       14,Glen Delta,Lowland,http://img/14.jpg\n";

fn label_images() -> Vec<(CatalogId, Vec<u8>)> {
    (11..=14i64)
        .map(|id| {
            let img = mosaic(id as u64 * 1000, 320, 240, 10);
            (CatalogId::Numeric(id), encode_png(&img))
        })
        .collect()
}

fn build_engine_with(images: &[(CatalogId, Vec<u8>)], cfg: EngineConfig) -> Engine {
    let builder = CorpusBuilder::new(
        DescriptorExtractor::new(cfg.extractor.clone()).unwrap(),
        MatchScheduler::new(cfg.workers).unwrap(),
    );
    let sources: Vec<_> = images
        .iter()
        .map(|(id, bytes)| SourceImage::from_bytes(id.clone(), id.to_string(), bytes.clone()))
        .collect();
    let (corpus, report) = builder.build(&sources).unwrap();
    assert_eq!(report.added, images.len());
    Engine::from_parts(corpus, table(CATALOG), cfg).unwrap()
}

fn build_engine(images: &[(CatalogId, Vec<u8>)]) -> Engine {
    let cfg = EngineConfig {
        workers: 2,
        ..EngineConfig::default()
    };
    build_engine_with(images, cfg)
}

#[test]
fn every_reference_identifies_itself() {
    let images = label_images();
    let engine = build_engine(&images);
    let min = engine.matching().min_match_count;

    for (id, bytes) in &images {
        match engine.identify(bytes).unwrap() {
            Identification::Matched { best, details } => {
                assert_eq!(&best.id, id);
                assert!(best.good_match_count >= min);
                assert_eq!(best.score, best.good_match_count as f32);
                assert_eq!(details.id(), id);
                assert!(details.get("image_url").is_none());
            }
            other => panic!("reference {id} not identified: {other:?}"),
        }
    }
}

#[test]
fn uniform_noise_is_no_match() {
    let engine = build_engine(&label_images());
    let query = encode_png(&noise(424242, 320, 240));
    let result = engine.identify(&query).unwrap();
    assert!(
        matches!(
            result,
            Identification::NoMatch(
                NoMatchReason::BelowThreshold | NoMatchReason::InsufficientDescriptors { .. }
            )
        ),
        "unexpected {result:?}"
    );
}

#[test]
fn identical_bytes_give_identical_answers() {
    let images = label_images();
    let engine = build_engine(&images);
    let first = engine.identify(&images[2].1).unwrap();
    let second = engine.identify(&images[2].1).unwrap();
    assert_eq!(first.best(), second.best());
    assert!(first.best().is_some());
}

#[test]
fn flat_image_has_too_few_descriptors() {
    let engine = build_engine(&label_images());
    let flat = image::GrayImage::from_pixel(200, 150, image::Luma([90u8]));
    let result = engine.identify(&encode_png(&flat)).unwrap();
    assert_eq!(
        result,
        Identification::NoMatch(NoMatchReason::InsufficientDescriptors {
            found: 0,
            required: 10
        })
    );
}

#[test]
fn ranked_identification_agrees_with_the_winner() {
    let images = label_images();
    let engine = build_engine(&images);
    let ranked = engine.identify_ranked(&images[1].1, 3).unwrap();
    let best = ranked.identification.best().unwrap();
    assert_eq!(best.id, CatalogId::Numeric(12));
    assert!(!ranked.ranking.is_empty());
    assert!(ranked.ranking.len() <= 3);
    assert_eq!(&ranked.ranking[0], best);
    let again = engine.identify(&images[1].1).unwrap();
    assert_eq!(ranked.identification, again);

    let unreadable = engine.identify_ranked(b"not an image", 3).unwrap();
    assert!(unreadable.ranking.is_empty());
    assert!(matches!(
        unreadable.identification,
        Identification::NoMatch(NoMatchReason::UnreadableImage { .. })
    ));
}

#[test]
fn budget_covers_decoding_and_extraction() {
    let reference = encode_png(&mosaic(77, 1024, 1024, 12));
    let budget = Duration::from_millis(1);
    let cfg = EngineConfig {
        workers: 2,
        time_budget: Some(budget),
        ..EngineConfig::default()
    };
    let images = vec![(CatalogId::Numeric(11), reference.clone())];
    let engine = build_engine_with(&images, cfg);

    match engine.identify(&reference) {
        Err(IdentifyError::Timeout {
            elapsed,
            budget: reported,
        }) => {
            assert_eq!(reported, budget);
            assert!(elapsed >= budget);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(matches!(
        engine.identify_ranked(&reference, 2),
        Err(IdentifyError::Timeout { .. })
    ));
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn engine_is_shareable_across_threads() {
    assert_send_sync::<Engine>();
    assert_send_sync::<IdentificationService>();
}

#[test]
fn concurrent_identify_calls_match_sequential_answers() {
    let images = label_images();
    let engine = build_engine(&images);
    let expected: Vec<_> = images
        .iter()
        .map(|(_, bytes)| engine.identify(bytes).unwrap())
        .collect();

    let answers: Vec<Vec<Identification>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let (engine, images) = (&engine, &images);
                scope.spawn(move || {
                    (0..images.len())
                        .map(|step| {
                            let (_, bytes) = &images[(worker + step) % images.len()];
                            engine.identify(bytes).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (worker, answers) in answers.iter().enumerate() {
        for (step, answer) in answers.iter().enumerate() {
            assert_eq!(answer, &expected[(worker + step) % images.len()]);
        }
    }
    assert_eq!(engine.scheduler().workers(), 2);
    assert!(engine.cache().len() <= images.len());
}

#[test]
fn initialize_from_disk_and_identify_path() {
    let dir = scratch_dir("pipeline-disk");
    let images = label_images();
    let catalog_images = dir.join("images");
    std::fs::create_dir_all(&catalog_images).unwrap();
    for (id, bytes) in &images {
        let path = catalog_images.join(format!("{}.png", id.file_stem()));
        std::fs::write(path, bytes).unwrap();
    }
    let catalog_path = dir.join("catalog.csv");
    std::fs::write(&catalog_path, CATALOG).unwrap();

    let listing = source_images_in_dir(&table(CATALOG), &catalog_images);
    assert!(listing.missing.is_empty());
    let builder = CorpusBuilder::new(
        DescriptorExtractor::default(),
        MatchScheduler::new(2).unwrap(),
    );
    let (corpus, _) = builder.build(&listing.images).unwrap();
    let corpus_path = dir.join("corpus.bin");
    corpus.save(&corpus_path).unwrap();

    let engine = Engine::initialize(&corpus_path, &catalog_path, EngineConfig::default()).unwrap();
    let query_path = catalog_images.join("13.png");
    let result = engine.identify_path(&query_path).unwrap();
    let best = result.best().unwrap();
    assert_eq!(best.id, CatalogId::Numeric(13));
    assert_eq!(result.details().unwrap().name(), "Glen Gamma");

    let ranked = engine.identify_path_ranked(&query_path, 4).unwrap();
    assert_eq!(ranked.ranking[0].id, CatalogId::Numeric(13));
    let query = engine.extractor().extract_path(&query_path).unwrap();
    assert_eq!(engine.rank(&query, 4).unwrap(), ranked.ranking);

    std::fs::remove_dir_all(&dir).unwrap();
}
