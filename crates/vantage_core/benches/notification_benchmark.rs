//! # Notification Fan-out Benchmark
//!
//! Measures one notification pass over a subtree insert and removal, and
//! the handle refresh that follows an `id` change.

#![allow(missing_docs)]

use std::any::Any;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vantage_core::{
    AdapterBehavior, AdapterCx, AdapterFactory, AdapterGraph, AdapterSite, Capabilities, Concern,
    RedrawQueue, SceneGraph, VisualNode,
};
use vantage_shared::{NodeId, SurfaceId};

struct Inert;

impl AdapterBehavior for Inert {
    fn capabilities(&self) -> Capabilities {
        Capabilities::RENDER
    }

    fn on_configured(&mut self, cx: &mut AdapterCx<'_>) {
        cx.connect_handle("material", "#shared");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct InertFactory;

impl AdapterFactory for InertFactory {
    fn concern(&self) -> Concern {
        Concern::Render
    }

    fn create(&self, _node: &VisualNode, _site: AdapterSite) -> Option<Box<dyn AdapterBehavior>> {
        Some(Box::new(Inert))
    }
}

fn build_subtree(scene: &mut SceneGraph, width: usize) -> NodeId {
    let group = scene.create_node("group");
    for _ in 0..width {
        let mesh = scene.create_node("mesh");
        let _ = scene.append_child(group, mesh);
    }
    group
}

fn bench_insert_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("notification_insert_remove");

    for width in [16, 256, 2048] {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("xml3d");
        let queue = RedrawQueue::new();
        let mut graph = AdapterGraph::new(queue.sender());
        graph.register_factory(Box::new(InertFactory));
        graph.attach_root(&scene, root, SurfaceId(1));
        let subtree = build_subtree(&mut scene, width);
        scene.take_mutations();

        group.bench_with_input(BenchmarkId::new("subtree", width), &width, |b, _| {
            b.iter(|| {
                let _ = scene.append_child(root, subtree);
                let inserted = scene.take_mutations();
                graph.process(&scene, inserted);
                let _ = scene.remove_child(root, subtree);
                let removed = scene.take_mutations();
                graph.process(&scene, removed);
                queue.drain();
                black_box(graph.live_count())
            });
        });
    }

    group.finish();
}

fn bench_handle_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("notification_handle_refresh");

    for width in [16, 256, 2048] {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("xml3d");
        let subtree = build_subtree(&mut scene, width);
        let material = scene.create_node("material");
        let _ = scene.append_child(root, subtree);
        let _ = scene.append_child(root, material);
        scene.take_mutations();

        let queue = RedrawQueue::new();
        let mut graph = AdapterGraph::new(queue.sender());
        graph.register_factory(Box::new(InertFactory));
        graph.attach_root(&scene, root, SurfaceId(1));

        let mut toggle = false;
        group.bench_with_input(BenchmarkId::new("subscribers", width), &width, |b, _| {
            b.iter(|| {
                toggle = !toggle;
                let id = if toggle { "shared" } else { "other" };
                let _ = scene.set_attribute(material, "id", id);
                let mutations = scene.take_mutations();
                graph.process(&scene, mutations);
                queue.drain();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert_remove, bench_handle_refresh);
criterion_main!(benches);
