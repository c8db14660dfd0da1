//! Ordering, admission and progress behaviour of the prefetch pipeline,
//! observed through the public exporter.

use std::sync::Arc;

use tiff_stack_export::{ExportOptions, FixedMemory, Page, StackExporter};

use super::test_utils::{record_progress, u16_samples, SyntheticVolume};

const GIB: u64 = 1 << 30;

fn first_samples(pages: &[Page]) -> Vec<u16> {
    pages.iter().map(|p| u16_samples(p.data())[0]).collect()
}

#[tokio::test]
async fn test_pages_follow_index_order_when_fetches_finish_backwards() {
    let volume =
        Arc::new(SyntheticVolume::new(&[("z", 8), ("y", 2), ("x", 2)]).reverse_completion(5));
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();

    // Hint-free window covers the whole stack
    let mut options = ExportOptions::default();
    options.policy.default_window = 8;
    let exporter_all = StackExporter::new(Arc::clone(&volume), options).unwrap();

    for exporter in [&exporter, &exporter_all] {
        let mut pages: Vec<Page> = Vec::new();
        exporter
            .export_with(&mut pages, &FixedMemory(GIB))
            .await
            .unwrap();
        assert_eq!(first_samples(&pages), vec![0, 4, 8, 12, 16, 20, 24, 28]);
    }
}

#[tokio::test]
async fn test_window_derived_from_memory_caps_concurrency() {
    // 20 * 30 pixels * 2 bytes = 1200 bytes per slice; half of 4800 usable
    let volume = Arc::new(
        SyntheticVolume::new(&[("z", 10), ("c", 1), ("y", 20), ("x", 30)])
            .with_ram_per_pixel(2.0)
            .with_delay(|_| 3),
    );
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();
    assert_eq!(exporter.window_size(&FixedMemory(4800)), 2);

    let mut pages: Vec<Page> = Vec::new();
    let summary = exporter
        .export_with(&mut pages, &FixedMemory(4800))
        .await
        .unwrap();

    assert_eq!(pages.len(), 10);
    assert_eq!(summary.window_size, 2);
    assert_eq!(summary.peak_in_flight, 2);
    assert!(volume.max_active() <= 2);
    assert_eq!(volume.fetch_count(), 10);
}

#[tokio::test]
async fn test_tiny_memory_still_makes_progress() {
    let volume = Arc::new(
        SyntheticVolume::new(&[("z", 4), ("y", 16), ("x", 16)]).with_ram_per_pixel(1e9),
    );
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();

    let mut pages: Vec<Page> = Vec::new();
    let summary = exporter
        .export_with(&mut pages, &FixedMemory(1024))
        .await
        .unwrap();

    assert_eq!(summary.window_size, 1);
    assert_eq!(summary.peak_in_flight, 1);
    assert_eq!(pages.len(), 4);
}

#[tokio::test]
async fn test_default_window_without_hint() {
    let volume =
        Arc::new(SyntheticVolume::new(&[("z", 12), ("y", 4), ("x", 4)]).with_delay(|_| 1));
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();

    for available in [0, 1 << 20, GIB] {
        assert_eq!(exporter.window_size(&FixedMemory(available)), 4);
    }

    let mut pages: Vec<Page> = Vec::new();
    let summary = exporter
        .export_with(&mut pages, &FixedMemory(0))
        .await
        .unwrap();
    assert_eq!(summary.window_size, 4);
    assert!(volume.max_active() <= 4);
}

#[tokio::test]
async fn test_window_larger_than_stack() {
    let volume = Arc::new(SyntheticVolume::new(&[("z", 2), ("y", 4), ("x", 4)]));
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();

    let mut pages: Vec<Page> = Vec::new();
    let summary = exporter
        .export_with(&mut pages, &FixedMemory(GIB))
        .await
        .unwrap();

    assert_eq!(summary.window_size, 4);
    assert_eq!(summary.peak_in_flight, 2);
    assert_eq!(volume.fetch_count(), 2);
}

#[tokio::test]
async fn test_tiny_cost_hint_stays_bounded_by_stack() {
    // Saturates the computed window far beyond the three slices
    let volume = Arc::new(
        SyntheticVolume::new(&[("z", 3), ("y", 2), ("x", 2)]).with_ram_per_pixel(1e-9),
    );
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();
    let memory = FixedMemory(64 << 30);
    assert!(exporter.window_size(&memory) > 1 << 40);

    let mut pages: Vec<Page> = Vec::new();
    let summary = exporter.export_with(&mut pages, &memory).await.unwrap();

    assert_eq!(first_samples(&pages), vec![0, 4, 8]);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.peak_in_flight, 3);
    assert_eq!(volume.fetch_count(), 3);
}

#[tokio::test]
async fn test_progress_sequence() {
    let volume = Arc::new(SyntheticVolume::new(&[("z", 10), ("c", 1), ("y", 20), ("x", 30)]));
    let exporter = StackExporter::new(volume, ExportOptions::default()).unwrap();
    let progress = record_progress(exporter.progress());

    let mut pages: Vec<Page> = Vec::new();
    exporter
        .export_with(&mut pages, &FixedMemory(GIB))
        .await
        .unwrap();

    assert_eq!(
        *progress.lock().unwrap(),
        vec![0, 0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
    );
}

#[tokio::test]
async fn test_unsubscribed_observer_sees_nothing_more() {
    let volume = Arc::new(SyntheticVolume::new(&[("z", 3), ("y", 2), ("x", 2)]));
    let exporter = StackExporter::new(volume, ExportOptions::default()).unwrap();

    let kept = record_progress(exporter.progress());
    let dropped = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&dropped);
    let id = exporter
        .progress()
        .subscribe(move |p| sink.lock().unwrap().push(p));
    assert!(exporter.progress().unsubscribe(id));

    let mut pages: Vec<Page> = Vec::new();
    exporter
        .export_with(&mut pages, &FixedMemory(GIB))
        .await
        .unwrap();

    assert!(dropped.lock().unwrap().is_empty());
    assert_eq!(kept.lock().unwrap().last(), Some(&100));
}

#[tokio::test]
async fn test_exporter_can_run_twice() {
    let volume = Arc::new(SyntheticVolume::new(&[("z", 3), ("y", 2), ("x", 2)]));
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();

    for _ in 0..2 {
        let mut pages: Vec<Page> = Vec::new();
        exporter
            .export_with(&mut pages, &FixedMemory(GIB))
            .await
            .unwrap();
        assert_eq!(pages.len(), 3);
    }
    assert_eq!(volume.fetch_count(), 6);
}
