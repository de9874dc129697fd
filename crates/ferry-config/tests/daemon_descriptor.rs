use std::cell::RefCell;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use ferry_config::{DaemonDescriptor, DaemonUser, DescriptorError, WebServerSettings};

struct DescriptorWorld {
    _temp_dir: TempDir,
    config_dir: Utf8PathBuf,
    result: Option<Result<DaemonDescriptor, DescriptorError>>,
}

impl DescriptorWorld {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let config_dir =
            Utf8PathBuf::from_path_buf(temp_dir.path().join("ferry")).expect("utf8 temp dir");
        Self {
            _temp_dir: temp_dir,
            config_dir,
            result: None,
        }
    }

    fn store(&self, descriptor: &DaemonDescriptor) {
        descriptor
            .store(&self.config_dir)
            .expect("store descriptor");
    }

    fn descriptor(&self) -> &DaemonDescriptor {
        match self.result.as_ref() {
            Some(Ok(descriptor)) => descriptor,
            Some(Err(error)) => panic!("descriptor failed to load: {error}"),
            None => panic!("descriptor was not read"),
        }
    }
}

#[fixture]
fn world() -> RefCell<DescriptorWorld> {
    RefCell::new(DescriptorWorld::new())
}

#[given("a daemon descriptor listing the user \"{user}\" and a port user \"{port_user}\"")]
fn given_descriptor_with_users(world: &RefCell<DescriptorWorld>, user: String, port_user: String) {
    let descriptor = DaemonDescriptor {
        web_server: WebServerSettings {
            bind_address: "127.0.0.1".to_owned(),
            bind_port: 8443,
        },
        users: vec![DaemonUser::new(user, "secret")],
        port_user: Some(DaemonUser::new(port_user, "port-secret")),
        folders: Vec::new(),
    };
    world.borrow().store(&descriptor);
}

#[given("a daemon descriptor without users")]
fn given_descriptor_without_users(world: &RefCell<DescriptorWorld>) {
    world.borrow().store(&DaemonDescriptor::default());
}

#[when("the client reads the descriptor")]
fn when_client_reads(world: &RefCell<DescriptorWorld>) {
    let mut world = world.borrow_mut();
    let result = DaemonDescriptor::load(&world.config_dir).and_then(|descriptor| {
        descriptor.first_user()?;
        Ok(descriptor)
    });
    world.result = Some(result);
}

#[then("the client authenticates as \"{user}\"")]
fn then_authenticates_as(world: &RefCell<DescriptorWorld>, user: String) {
    let world = world.borrow();
    let first = world.descriptor().first_user().expect("first user");
    assert_eq!(first.username, user);
}

#[then("the endpoint URL is \"{url}\"")]
fn then_endpoint_url(world: &RefCell<DescriptorWorld>, url: String) {
    assert_eq!(world.borrow().descriptor().websocket_url(), url);
}

#[then("reading the descriptor fails with \"{fragment}\"")]
fn then_reading_fails(world: &RefCell<DescriptorWorld>, fragment: String) {
    let world = world.borrow();
    match world.result.as_ref() {
        Some(Err(error)) => assert!(
            error.to_string().contains(&fragment),
            "unexpected error: {error}"
        ),
        Some(Ok(_)) => panic!("descriptor should have been rejected"),
        None => panic!("descriptor was not read"),
    }
}

#[scenario(
    path = "tests/features/daemon_descriptor.feature",
    name = "A descriptor with users yields the first user's credentials"
)]
fn descriptor_with_users(world: RefCell<DescriptorWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/daemon_descriptor.feature",
    name = "A descriptor without users is rejected"
)]
fn descriptor_without_users(world: RefCell<DescriptorWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/daemon_descriptor.feature",
    name = "A missing descriptor is rejected"
)]
fn missing_descriptor(world: RefCell<DescriptorWorld>) {
    let _ = world;
}
