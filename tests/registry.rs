use kiln::{CacheError, CreationError, DeviceKey, MainCacher, TypeToken};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

struct ShaderModule;
struct Pipeline;

fn shader_factory(source: &&'static str, _: Option<&DeviceKey>) -> Result<String, CreationError> {
    Ok(format!("spirv({source})"))
}

fn pipeline_factory(params: &u32, device: Option<&DeviceKey>) -> Result<String, CreationError> {
    let device = device.ok_or_else(|| CreationError::new("pipeline factory needs a device"))?;
    Ok(format!("pipeline-{params}@{device}"))
}

#[test]
fn registration_is_visible_through_lookups() {
    let main = MainCacher::new();
    let token = TypeToken::of::<Pipeline>();

    assert!(!main.is_registered(token));
    assert!(main.type_name(token).is_none());
    assert!(!main.is_device_dependent(token));

    main.register_cacher::<String, u32, _>(token, "Pipeline", true, pipeline_factory)
        .unwrap();

    assert!(main.is_registered(token));
    assert_eq!(main.type_name(token).as_deref(), Some("Pipeline"));
    assert!(main.is_device_dependent(token));
}

#[test]
fn identical_re_registration_is_a_silent_no_op() {
    let main = MainCacher::new();
    let token = TypeToken::of::<ShaderModule>();

    main.register_cacher::<String, &'static str, _>(token, "ShaderModule", true, shader_factory)
        .unwrap();
    main.register_cacher::<String, &'static str, _>(token, "ShaderModule", true, shader_factory)
        .unwrap();

    assert!(main.is_registered(token));
    assert_eq!(main.registered_types().len(), 1);
}

#[test]
fn conflicting_descriptor_is_rejected() {
    let main = MainCacher::new();
    let token = TypeToken::of::<ShaderModule>();

    main.register_cacher::<String, &'static str, _>(token, "ShaderModule", true, shader_factory)
        .unwrap();

    let renamed = main.register_cacher::<String, &'static str, _>(
        token,
        "ShaderBlob",
        true,
        shader_factory,
    );
    assert!(matches!(renamed, Err(CacheError::Conflict { .. })));

    let reflagged = main.register_cacher::<String, &'static str, _>(
        token,
        "ShaderModule",
        false,
        shader_factory,
    );
    assert!(matches!(reflagged, Err(CacheError::Conflict { .. })));

    let retyped =
        main.register_cacher::<Vec<u8>, &'static str, _>(token, "ShaderModule", true, |_, _| {
            Ok(Vec::new())
        });
    assert!(matches!(retyped, Err(CacheError::Conflict { .. })));

    assert_eq!(main.type_name(token).as_deref(), Some("ShaderModule"));
}

#[test]
fn unregistered_token_is_a_configuration_error() {
    let main = MainCacher::new();
    let result = main.cacher::<String, u32>(TypeToken::of::<Pipeline>(), None);
    assert!(matches!(result, Err(CacheError::Configuration { .. })));
}

#[test]
fn mismatched_generics_are_rejected() {
    let main = MainCacher::new();
    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", false, |params, _| {
        Ok(params.to_string())
    })
    .unwrap();

    let result = main.cacher::<Vec<u8>, u32>(token, None);
    assert!(matches!(result, Err(CacheError::Mismatch { .. })));
}

#[test]
fn device_dependent_type_needs_a_device() {
    let main = MainCacher::new();
    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", true, pipeline_factory)
        .unwrap();

    let result = main.cacher::<String, u32>(token, None);
    assert!(matches!(result, Err(CacheError::DeviceRequired { .. })));
}

#[test]
fn device_independent_cacher_is_a_process_wide_singleton() {
    let main = MainCacher::new();
    let token = TypeToken::of::<ShaderModule>();
    main.register_cacher::<String, &'static str, _>(token, "ShaderModule", false, shader_factory)
        .unwrap();

    let device = DeviceKey::new(0, "iGPU");
    let bare = main.cacher::<String, &'static str>(token, None).unwrap();
    let with_device = main
        .cacher::<String, &'static str>(token, Some(&device))
        .unwrap();

    assert!(Arc::ptr_eq(&bare, &with_device));

    // compile once, visible from every device
    bare.get_or_create(&"fullscreen.vert").unwrap();
    assert!(with_device.peek(&"fullscreen.vert").is_some());
}

#[test]
fn device_dependent_cachers_are_isolated_per_device() {
    let main = MainCacher::new();
    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", true, pipeline_factory)
        .unwrap();

    let igpu = DeviceKey::new(0, "iGPU");
    let dgpu = DeviceKey::new(1, "dGPU");

    let on_igpu = main.cacher::<String, u32>(token, Some(&igpu)).unwrap();
    let on_dgpu = main.cacher::<String, u32>(token, Some(&dgpu)).unwrap();
    assert!(!Arc::ptr_eq(&on_igpu, &on_dgpu));

    let again = main.cacher::<String, u32>(token, Some(&igpu)).unwrap();
    assert!(Arc::ptr_eq(&on_igpu, &again));

    on_igpu.get_or_create(&7).unwrap();
    assert!(on_igpu.peek(&7).is_some());
    assert!(on_dgpu.peek(&7).is_none());
}

#[test]
fn concurrent_requests_observe_one_instance_per_device() {
    let main = Arc::new(MainCacher::new());
    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", true, pipeline_factory)
        .unwrap();

    let device = DeviceKey::new(3, "dGPU");
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let main = main.clone();
            let device = device.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                main.cacher::<String, u32>(token, Some(&device)).unwrap()
            })
        })
        .collect();

    let cachers: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    for cacher in &cachers {
        assert!(Arc::ptr_eq(&cachers[0], cacher));
    }
}

#[test]
fn retiring_a_device_releases_only_its_entries() {
    let _ = env_logger::builder().is_test(true).try_init();

    let main = MainCacher::new();
    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", true, pipeline_factory)
        .unwrap();

    let igpu = DeviceKey::new(0, "iGPU");
    let dgpu = DeviceKey::new(1, "dGPU");

    let on_igpu = main.cacher::<String, u32>(token, Some(&igpu)).unwrap();
    let on_dgpu = main.cacher::<String, u32>(token, Some(&dgpu)).unwrap();
    on_igpu.get_or_create(&1).unwrap();
    on_igpu.get_or_create(&2).unwrap();
    let kept = on_dgpu.get_or_create(&1).unwrap();

    assert_eq!(main.retire_device(&igpu), 2);

    let gone = main.cacher::<String, u32>(token, Some(&igpu));
    assert!(matches!(gone, Err(CacheError::DeviceRetired { .. })));

    let still_there = main.cacher::<String, u32>(token, Some(&dgpu)).unwrap();
    assert!(Arc::ptr_eq(&on_dgpu, &still_there));
    let reread = still_there.peek(&1).unwrap();
    assert!(Arc::ptr_eq(&kept, &reread));
}

#[test]
fn retiring_an_unknown_device_releases_nothing() {
    let main = MainCacher::new();
    let ghost = DeviceKey::new(99, "ghost");

    assert_eq!(main.retire_device(&ghost), 0);

    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", true, pipeline_factory)
        .unwrap();
    let result = main.cacher::<String, u32>(token, Some(&ghost));
    assert!(matches!(result, Err(CacheError::DeviceRetired { .. })));
}

#[test]
fn clearing_global_caches_keeps_registrations() {
    let main = MainCacher::new();
    let token = TypeToken::of::<ShaderModule>();
    main.register_cacher::<String, &'static str, _>(token, "ShaderModule", false, shader_factory)
        .unwrap();

    let before = main.cacher::<String, &'static str>(token, None).unwrap();
    before.get_or_create(&"sky.frag").unwrap();

    main.clear_global_caches();

    assert!(main.is_registered(token));
    let after = main.cacher::<String, &'static str>(token, None).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.peek(&"sky.frag").is_none());
}

#[test]
fn stats_count_registries_cachers_and_entries() {
    let main = MainCacher::new();
    let shader_token = TypeToken::of::<ShaderModule>();
    let pipeline_token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, &'static str, _>(
        shader_token,
        "ShaderModule",
        false,
        shader_factory,
    )
    .unwrap();
    main.register_cacher::<String, u32, _>(pipeline_token, "Pipeline", true, pipeline_factory)
        .unwrap();

    let igpu = DeviceKey::new(0, "iGPU");
    let dgpu = DeviceKey::new(1, "dGPU");

    let shaders = main
        .cacher::<String, &'static str>(shader_token, None)
        .unwrap();
    shaders.get_or_create(&"sky.frag").unwrap();

    let on_igpu = main
        .cacher::<String, u32>(pipeline_token, Some(&igpu))
        .unwrap();
    on_igpu.get_or_create(&1).unwrap();
    on_igpu.get_or_create(&2).unwrap();
    main.cacher::<String, u32>(pipeline_token, Some(&dgpu))
        .unwrap();

    let stats = main.stats();
    assert_eq!(stats.registered_types, 2);
    assert_eq!(stats.global_cachers, 1);
    assert_eq!(stats.device_registries, 2);
    assert_eq!(stats.device_cachers, 2);
    assert_eq!(stats.global_entries, 1);
    assert_eq!(stats.device_entries, 2);

    let mut names = main.registered_types();
    names.sort();
    assert_eq!(
        names.iter().map(|n| n.as_ref()).collect::<Vec<_>>(),
        ["Pipeline", "ShaderModule"]
    );

    let mut devices = main.active_devices();
    devices.sort_by_key(|d| d.id());
    assert_eq!(devices, [igpu, dgpu]);
}

#[test]
fn factory_receives_the_owning_device() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let main = MainCacher::new();
    let token = TypeToken::of::<Pipeline>();
    main.register_cacher::<String, u32, _>(token, "Pipeline", true, move |params, device| {
        counter.fetch_add(1, Ordering::SeqCst);
        let device = device.ok_or_else(|| CreationError::new("missing device"))?;
        Ok(format!("{params}@{}", device.name()))
    })
    .unwrap();

    let device = DeviceKey::new(7, "dGPU");
    let cacher = main.cacher::<String, u32>(token, Some(&device)).unwrap();
    let built = cacher.get_or_create(&5).unwrap();

    assert_eq!(*built, "5@dGPU");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
