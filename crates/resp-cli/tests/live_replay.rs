mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::{assert_close, path, series_file, sine};
use resp_lib::imu::ImuChannel;
use resp_lib::live::{Channel, FusedResult, SensorGroup};
use std::error::Error;

#[test]
fn replay_emits_once_per_hop_after_warm_up() -> Result<(), Box<dyn Error>> {
    // 40 s at 50 Hz: first result once 30 s are buffered, then every second
    let input = series_file(&sine(50.0, 0.2, 40.0, 0.05, 1.0));
    let mut cmd = cargo_bin_cmd!("resp");
    cmd.args(["live-replay", "--imu-fs", "50", "--input", &path(&input)]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(out)?;

    let results: Vec<FusedResult> = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(results.len(), 11);
    assert_close(results[0].time_s, 29.98, 1e-9);
    assert_close(results[1].time_s - results[0].time_s, 1.0, 1e-9);

    for result in &results {
        assert_eq!(result.group, SensorGroup::Imu);
        assert_eq!(result.manual_brpm, None);
        let z = result
            .channels
            .iter()
            .find(|c| c.channel == Channel::Imu(ImuChannel::Z))
            .expect("z channel");
        let brpm = z.result.brpm().expect("z estimate");
        assert_close(brpm, 12.0, 1.0);
    }
    Ok(())
}

#[test]
fn replay_shorter_than_a_window_prints_nothing() {
    let input = series_file(&sine(50.0, 0.2, 10.0, 0.05, 1.0));
    let mut cmd = cargo_bin_cmd!("resp");
    cmd.args(["live-replay", "--imu-fs", "50", "--input", &path(&input)]);
    let out = cmd.assert().success().get_output().stdout.clone();
    assert!(out.is_empty());
}
