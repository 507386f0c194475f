//! All services on one executor, driven through their clients.

use std::sync::Arc;

use service_abi::{GetFlags, Status};
use services_block::{BlockQueue, DiskConfig, Fault, MemoryDisk};
use services_fabric::{ByteRingClient, HwDevice, KerncfgClient};
use services_hw::{HwDeviceConfig, HwDeviceObject};
use services_kerncfg::{Kerncfg, KerncfgConfig, KernelLogLayer, RingConfig, RingPurpose};
use tracing_subscriber::layer::SubscriberExt;
use transport_fabric::{MemoryRegion, Runtime};

#[test]
fn services_share_one_runtime() {
    let mut runtime = Runtime::new();
    let config = KerncfgConfig {
        cmdline: "root=/dev/vda".into(),
        os_trace_ring: Some(RingConfig::new(512)),
        ..KerncfgConfig::default()
    };
    let kerncfg = Kerncfg::start(&config, &runtime.spawner()).unwrap();
    let hw = services_hw::start(
        HwDeviceObject::new("virtio0", &HwDeviceConfig::default()),
        &runtime.spawner(),
    )
    .unwrap();
    let block = BlockQueue::start(MemoryDisk::new(DiskConfig::default()), &runtime.spawner())
        .unwrap();

    let kerncfg_client = KerncfgClient::new(kerncfg.connect().unwrap());
    let device = HwDevice::new(hw.connect().unwrap());
    let trace = ByteRingClient::new(kerncfg.connect_ring(RingPurpose::OsTrace).unwrap());
    kerncfg
        .rings()
        .get(RingPurpose::OsTrace)
        .unwrap()
        .append(b"trace event");

    let (cmdline, bar, sector, traced) = runtime.run_until(async {
        let cmdline = kerncfg_client.cmdline().await.unwrap();
        device.claim_device().await.unwrap();
        let bar = device.access_bar(0).await.unwrap();
        block.write_sectors(3, vec![9; 512]).await.unwrap();
        let sector = block.read_sectors(3, 1).await.unwrap();
        let traced = trace
            .reader(0)
            .read(64, 0, GetFlags::NO_WAIT)
            .await
            .unwrap();
        (cmdline, bar, sector, traced)
    });

    assert_eq!(cmdline, "root=/dev/vda");
    assert_eq!(bar.base, 0xfebc_0000);
    assert!(matches!(bar, MemoryRegion { len: 0x2_0000, .. }));
    assert_eq!(sector, vec![9; 512]);
    assert_eq!(traced.data, b"trace event");
}

#[test]
fn device_failure_is_logged_and_isolated() {
    let mut runtime = Runtime::new();
    let kerncfg = Kerncfg::start(&KerncfgConfig::default(), &runtime.spawner()).unwrap();
    let subscriber = tracing_subscriber::registry()
        .with(KernelLogLayer::new(Arc::clone(kerncfg.kernel_log())));
    let _guard = tracing::subscriber::set_default(subscriber);

    let block = BlockQueue::start(MemoryDisk::new(DiskConfig::default()), &runtime.spawner())
        .unwrap();
    let log = ByteRingClient::new(kerncfg.connect_ring(RingPurpose::KernelLog).unwrap());

    block.disk().inject_status(Fault::Status(2));
    let (failed, recovered, logged) = runtime.run_until(async {
        let failed = block.read_sectors(0, 1).await;
        let recovered = block.read_sectors(0, 1).await;
        let logged = log
            .reader(0)
            .read(4096, 0, GetFlags::NO_WAIT)
            .await
            .unwrap();
        (failed, recovered, logged)
    });

    assert!(failed.is_err());
    assert!(recovered.is_ok());
    assert_eq!(logged.status, Status::Success);
    let text = String::from_utf8_lossy(&logged.data);
    assert!(text.contains("ERROR services_common"), "{text}");
    assert!(text.contains("device operation failed"), "{text}");
}

#[test]
fn claim_is_shared_across_connections() {
    let mut runtime = Runtime::new();
    let hw = services_hw::start(
        HwDeviceObject::new("nic0", &HwDeviceConfig::default()),
        &runtime.spawner(),
    )
    .unwrap();
    let first = HwDevice::new(hw.connect().unwrap());
    let second = HwDevice::new(hw.connect().unwrap());

    let outcome = runtime.run_until(async {
        first.claim_device().await.unwrap();
        second.claim_device().await
    });
    assert_eq!(outcome.unwrap_err().status(), Some(Status::AlreadyClaimed));
}
