//! Integration tests for trampoline generation and invocation

use calltarget_duck::ProxyCache;
use calltarget_engine::{
    CallTargetError, CallTargetState, CallbackDescriptor, CallbackParam, CallbackResult,
    CallbackValue, GenericParam, IntegrationDescriptor, IntegrationMapper, IntegrationRegistry,
    SessionId,
};
use calltarget_types::{
    getter_fn, method_fn, setter_fn, Access, Shape, ShapeId, ShapeRegistry, ShapeTypeRef,
    TypeDescriptor, TypeId, TypeKind, TypeRegistry, Value,
};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct HttpClient {
    host: String,
}

struct HttpRequest {
    path: String,
}

struct HttpResponse {
    status: i64,
}

struct Fixture {
    types: Arc<TypeRegistry>,
    shapes: Arc<ShapeRegistry>,
    client_ty: TypeId,
    request_ty: TypeId,
    response_ty: TypeId,
    iclient: ShapeId,
    irequest: ShapeId,
    iresponse: ShapeId,
}

fn fixture() -> Fixture {
    let types = Arc::new(TypeRegistry::new());
    let shapes = Arc::new(ShapeRegistry::new());
    let client_ty = types
        .register(
            TypeDescriptor::builder("HttpClient", TypeKind::Reference)
                .property(
                    "host",
                    TypeId::STRING,
                    Some(getter_fn::<HttpClient, _>(|c| Value::str(c.host.clone()))),
                    None,
                )
                .build(),
        )
        .unwrap();
    let request_ty = types
        .register(
            TypeDescriptor::builder("HttpRequest", TypeKind::Reference)
                .property(
                    "path",
                    TypeId::STRING,
                    Some(getter_fn::<HttpRequest, _>(|r| Value::str(r.path.clone()))),
                    Some(setter_fn::<HttpRequest, _>(|r, v| {
                        r.path = v.as_str().unwrap_or_default().to_string();
                        Ok(())
                    })),
                )
                .build(),
        )
        .unwrap();
    let response_ty = types
        .register(
            TypeDescriptor::builder("HttpResponse", TypeKind::Reference)
                .property(
                    "status",
                    TypeId::I64,
                    Some(getter_fn::<HttpResponse, _>(|r| Value::I64(r.status))),
                    None,
                )
                .build(),
        )
        .unwrap();
    let iclient = shapes
        .register(
            Shape::builder("IClient")
                .property("host", ShapeTypeRef::Concrete(TypeId::STRING), Access::Read)
                .build(),
        )
        .unwrap();
    let irequest = shapes
        .register(
            Shape::builder("IRequest")
                .property(
                    "path",
                    ShapeTypeRef::Concrete(TypeId::STRING),
                    Access::ReadWrite,
                )
                .build(),
        )
        .unwrap();
    let iresponse = shapes
        .register(
            Shape::builder("IResponse")
                .property("status", ShapeTypeRef::Concrete(TypeId::I64), Access::Read)
                .build(),
        )
        .unwrap();
    Fixture {
        types,
        shapes,
        client_ty,
        request_ty,
        response_ty,
        iclient,
        irequest,
        iresponse,
    }
}

fn begin_callback(fx: &Fixture) -> CallbackDescriptor {
    CallbackDescriptor::begin(
        vec![
            GenericParam::constrained(fx.iclient),
            GenericParam::constrained(fx.irequest),
        ],
        vec![CallbackParam::Generic(0), CallbackParam::Generic(1)],
        Arc::new(|values: &[CallbackValue]| {
            let client = values[0].as_proxy().expect("instance proxy");
            let request = values[1].as_proxy().expect("request proxy");
            let host = client.get("host").unwrap().to_raw();
            let path = request.get("path").unwrap().to_raw();
            let tag = format!(
                "{}{}",
                host.as_str().unwrap_or_default(),
                path.as_str().unwrap_or_default()
            );
            CallbackResult::State(CallTargetState::with_state(Value::str(tag)))
        }),
    )
}

fn end_callback(fx: &Fixture) -> CallbackDescriptor {
    CallbackDescriptor::end(
        vec![
            GenericParam::unconstrained(),
            GenericParam::constrained(fx.iresponse),
        ],
        vec![
            CallbackParam::Generic(1),
            CallbackParam::Exception,
            CallbackParam::State,
        ],
        Arc::new(|values: &[CallbackValue]| CallbackResult::Return(Some(values[0].clone()))),
    )
}

fn http_integration(fx: &Fixture) -> IntegrationDescriptor {
    IntegrationDescriptor::new("http-client", "HttpClientSendIntegration")
        .with_begin(begin_callback(fx))
        .with_end(end_callback(fx))
}

fn mapper_for(fx: &Fixture) -> IntegrationMapper {
    IntegrationMapper::new(ProxyCache::new(fx.types.clone(), fx.shapes.clone()))
}

#[test]
fn test_begin_trampoline_end_to_end() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = http_integration(&fx);
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let invoker = mapper
        .create_begin_invoker(
            id,
            &descriptor,
            SessionId::default(),
            fx.client_ty,
            &[fx.request_ty],
        )
        .unwrap()
        .expect("begin hook present");

    let client = Value::instance(
        fx.client_ty,
        HttpClient {
            host: String::from("example.test"),
        },
    );
    let request = Value::instance(
        fx.request_ty,
        HttpRequest {
            path: String::from("/orders"),
        },
    );
    let state = invoker.invoke(&client, &[request]).unwrap();
    assert_eq!(state.state(), Some(&Value::str("example.test/orders")));
}

#[test]
fn test_absent_hook_is_cached_noop() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = IntegrationDescriptor::new("end-only", "EndOnlyIntegration")
        .with_end(end_callback(&fx));
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let first = mapper
        .create_begin_invoker(id, &descriptor, SessionId::default(), fx.client_ty, &[])
        .unwrap();
    let second = mapper
        .create_begin_invoker(id, &descriptor, SessionId::default(), fx.client_ty, &[])
        .unwrap();
    assert!(first.is_none());
    assert!(second.is_none());
}

#[test]
fn test_begin_with_wrong_return_kind_fails() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    // An end-shaped callback attached to the begin hook.
    let descriptor = IntegrationDescriptor::new("bad-begin", "BadBeginIntegration").with_begin(
        CallbackDescriptor::end_void(
            vec![GenericParam::unconstrained()],
            vec![CallbackParam::Exception, CallbackParam::State],
            Arc::new(|_| CallbackResult::Return(None)),
        ),
    );
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let err = mapper
        .create_begin_invoker(id, &descriptor, SessionId::default(), fx.client_ty, &[])
        .unwrap_err();
    assert!(matches!(err, CallTargetError::ReturnTypeMismatch { .. }));
}

#[test]
fn test_end_trampoline_unwraps_proxied_return() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = http_integration(&fx);
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let invoker = mapper
        .create_end_invoker(
            id,
            &descriptor,
            SessionId::default(),
            fx.client_ty,
            Some(fx.response_ty),
        )
        .unwrap()
        .expect("end hook present");

    let client = Value::instance(
        fx.client_ty,
        HttpClient {
            host: String::from("example.test"),
        },
    );
    let response = Value::instance(fx.response_ty, HttpResponse { status: 200 });
    let result = invoker
        .invoke(&client, Some(&response), None, CallTargetState::default())
        .unwrap();

    // The callback saw a proxy; the caller gets the original instance back.
    assert_eq!(result.value(), Some(&response));
}

#[test]
fn test_end_against_void_target_is_return_type_mismatch() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = http_integration(&fx);
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    // The callback declares a wrapped return value; the instrumented
    // method returns nothing.
    let err = mapper
        .create_end_invoker(id, &descriptor, SessionId::default(), fx.client_ty, None)
        .unwrap_err();
    assert!(matches!(err, CallTargetError::ReturnTypeMismatch { .. }));
}

#[test]
fn test_boxing_happens_exactly_once_and_original_is_untouched() {
    #[derive(Clone)]
    struct RetryPolicy {
        budget: i64,
    }

    let types = Arc::new(TypeRegistry::new());
    let shapes = Arc::new(ShapeRegistry::new());
    let clones = Arc::new(AtomicUsize::new(0));
    let counter = clones.clone();
    let retry_ty = types
        .register(
            TypeDescriptor::builder("RetryPolicy", TypeKind::ValueType)
                .method(
                    "consume",
                    vec![],
                    TypeId::I64,
                    method_fn::<RetryPolicy, _>(|p, _| {
                        p.budget -= 1;
                        Ok(Value::I64(p.budget))
                    }),
                )
                .property(
                    "budget",
                    TypeId::I64,
                    Some(getter_fn::<RetryPolicy, _>(|p| Value::I64(p.budget))),
                    None,
                )
                .clone_with(Arc::new(move |payload| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    payload
                        .downcast_ref::<RetryPolicy>()
                        .map(|p| Box::new(p.clone()) as Box<dyn Any + Send + Sync>)
                }))
                .build(),
        )
        .unwrap();
    let iretry = shapes
        .register(
            Shape::builder("IRetryPolicy")
                .method("consume", vec![], ShapeTypeRef::Concrete(TypeId::I64))
                .property("budget", ShapeTypeRef::Concrete(TypeId::I64), Access::Read)
                .build(),
        )
        .unwrap();

    let registry = IntegrationRegistry::new();
    let descriptor = IntegrationDescriptor::new("retry", "RetryIntegration").with_begin(
        CallbackDescriptor::begin(
            vec![GenericParam::constrained(iretry)],
            vec![CallbackParam::Generic(0)],
            Arc::new(|values: &[CallbackValue]| {
                let policy = values[0].as_proxy().expect("boxed instance proxy");
                // Mutations land on the boxed copy and are observable
                // through the same proxy.
                policy.invoke("consume", &[]).unwrap();
                policy.invoke("consume", &[]).unwrap();
                let budget = policy.get("budget").unwrap().to_raw();
                CallbackResult::State(CallTargetState::with_state(budget))
            }),
        ),
    );
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = IntegrationMapper::new(ProxyCache::new(types, shapes));

    let invoker = mapper
        .create_begin_invoker(id, &descriptor, SessionId::default(), retry_ty, &[])
        .unwrap()
        .expect("begin hook present");

    let original = Value::instance(retry_ty, RetryPolicy { budget: 3 });
    let state = invoker.invoke(&original, &[]).unwrap();

    assert_eq!(state.state(), Some(&Value::I64(1)));
    assert_eq!(clones.load(Ordering::SeqCst), 1);
    let untouched = original
        .as_instance()
        .unwrap()
        .borrow::<RetryPolicy, _>(|p| p.budget)
        .unwrap();
    assert_eq!(untouched, 3);
}

#[test]
fn test_concurrent_first_calls_publish_one_trampoline() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = Arc::new(http_integration(&fx));
    let id = registry.register((*descriptor).clone()).unwrap();
    let mapper = Arc::new(mapper_for(&fx));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let mapper = mapper.clone();
        let descriptor = descriptor.clone();
        let client_ty = fx.client_ty;
        let request_ty = fx.request_ty;
        handles.push(std::thread::spawn(move || {
            mapper
                .create_begin_invoker(
                    id,
                    &descriptor,
                    SessionId::default(),
                    client_ty,
                    &[request_ty],
                )
                .unwrap()
                .expect("begin hook present")
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for entry in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], entry));
    }
}

#[test]
fn test_new_session_creates_new_entry() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = http_integration(&fx);
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let first = mapper
        .create_begin_invoker(id, &descriptor, SessionId(0), fx.client_ty, &[fx.request_ty])
        .unwrap()
        .unwrap();
    let same_session = mapper
        .create_begin_invoker(id, &descriptor, SessionId(0), fx.client_ty, &[fx.request_ty])
        .unwrap()
        .unwrap();
    let new_session = mapper
        .create_begin_invoker(id, &descriptor, SessionId(1), fx.client_ty, &[fx.request_ty])
        .unwrap()
        .unwrap();

    assert!(Arc::ptr_eq(&first, &same_session));
    assert!(!Arc::ptr_eq(&first, &new_session));
}

#[test]
fn test_async_end_unwraps_and_preserves_context() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = IntegrationDescriptor::new("http-async", "HttpClientSendAsyncIntegration")
        .with_async_end(
            CallbackDescriptor::async_end(
                vec![
                    GenericParam::unconstrained(),
                    GenericParam::constrained(fx.iresponse),
                ],
                vec![
                    CallbackParam::Generic(1),
                    CallbackParam::Exception,
                    CallbackParam::State,
                ],
                Arc::new(|values: &[CallbackValue]| CallbackResult::AsyncReturn(values[0].clone())),
            )
            .with_preserve_context(),
        );
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let invoker = mapper
        .create_async_end_invoker(
            id,
            &descriptor,
            SessionId::default(),
            fx.client_ty,
            fx.response_ty,
        )
        .unwrap()
        .expect("async end hook present");
    assert!(invoker.preserve_context());

    let client = Value::instance(
        fx.client_ty,
        HttpClient {
            host: String::from("example.test"),
        },
    );
    let response = Value::instance(fx.response_ty, HttpResponse { status: 204 });
    let result = invoker
        .invoke(&client, Some(&response), None, CallTargetState::default())
        .unwrap();
    assert_eq!(result.value(), Some(&response));
}

#[test]
fn test_trampoline_argument_count_is_checked_at_call_time() {
    let fx = fixture();
    let registry = IntegrationRegistry::new();
    let descriptor = http_integration(&fx);
    let id = registry.register(descriptor.clone()).unwrap();
    let mapper = mapper_for(&fx);

    let invoker = mapper
        .create_begin_invoker(
            id,
            &descriptor,
            SessionId::default(),
            fx.client_ty,
            &[fx.request_ty],
        )
        .unwrap()
        .unwrap();

    let client = Value::instance(
        fx.client_ty,
        HttpClient {
            host: String::from("example.test"),
        },
    );
    let err = invoker.invoke(&client, &[]).unwrap_err();
    assert!(matches!(err, CallTargetError::ArgumentCountMismatch { .. }));
}
