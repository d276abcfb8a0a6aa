use calltarget_duck::ProxyCache;
use calltarget_engine::{
    CallTargetState, CallbackDescriptor, CallbackParam, CallbackResult, CallbackValue,
    GenericParam, IntegrationDescriptor, IntegrationMapper, IntegrationRegistry, SessionId,
};
use calltarget_types::{
    getter_fn, Access, Shape, ShapeRegistry, ShapeTypeRef, TypeDescriptor, TypeId, TypeKind,
    TypeRegistry, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

struct Producer {
    topic: String,
}

fn bench_steady_state_begin(c: &mut Criterion) {
    let types = Arc::new(TypeRegistry::new());
    let shapes = Arc::new(ShapeRegistry::new());
    let producer_ty = types
        .register(
            TypeDescriptor::builder("Producer", TypeKind::Reference)
                .property(
                    "topic",
                    TypeId::STRING,
                    Some(getter_fn::<Producer, _>(|p| Value::str(p.topic.clone()))),
                    None,
                )
                .build(),
        )
        .unwrap();
    let iproducer = shapes
        .register(
            Shape::builder("IProducer")
                .property("topic", ShapeTypeRef::Concrete(TypeId::STRING), Access::Read)
                .build(),
        )
        .unwrap();

    let descriptor = IntegrationDescriptor::new("producer", "ProducerSendIntegration")
        .with_begin(CallbackDescriptor::begin(
            vec![GenericParam::constrained(iproducer), GenericParam::unconstrained()],
            vec![CallbackParam::Generic(0), CallbackParam::Generic(1)],
            Arc::new(|values: &[CallbackValue]| {
                let producer = values[0].as_proxy().unwrap();
                let topic = producer.get("topic").unwrap().to_raw();
                CallbackResult::State(CallTargetState::with_state(topic))
            }),
        ));
    let registry = IntegrationRegistry::new();
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = IntegrationMapper::new(ProxyCache::new(types, shapes));

    // Generation happens once, outside the measured loop.
    let invoker = mapper
        .create_begin_invoker(
            id,
            &descriptor,
            SessionId::default(),
            producer_ty,
            &[TypeId::I64],
        )
        .unwrap()
        .unwrap();

    let instance = Value::instance(
        producer_ty,
        Producer {
            topic: String::from("orders"),
        },
    );
    let args = [Value::I64(11)];

    c.bench_function("begin_trampoline_invoke", |b| {
        b.iter(|| invoker.invoke(black_box(&instance), black_box(&args)).unwrap());
    });
}

fn bench_trampoline_cache_hit(c: &mut Criterion) {
    let types = Arc::new(TypeRegistry::new());
    let shapes = Arc::new(ShapeRegistry::new());
    let producer_ty = types
        .register(TypeDescriptor::builder("Producer", TypeKind::Reference).build())
        .unwrap();

    let descriptor = IntegrationDescriptor::new("producer", "ProducerSendIntegration")
        .with_begin(CallbackDescriptor::begin(
            vec![GenericParam::unconstrained()],
            vec![CallbackParam::Generic(0)],
            Arc::new(|_| CallbackResult::State(CallTargetState::default())),
        ));
    let registry = IntegrationRegistry::new();
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = IntegrationMapper::new(ProxyCache::new(types, shapes));

    mapper
        .create_begin_invoker(id, &descriptor, SessionId::default(), producer_ty, &[])
        .unwrap()
        .unwrap();

    c.bench_function("begin_trampoline_cache_hit", |b| {
        b.iter(|| {
            mapper
                .create_begin_invoker(
                    black_box(id),
                    black_box(&descriptor),
                    SessionId::default(),
                    black_box(producer_ty),
                    &[],
                )
                .unwrap()
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_steady_state_begin, bench_trampoline_cache_hit);
criterion_main!(benches);
