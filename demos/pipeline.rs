// demos/pipeline.rs
//
// A two-stage bounded pipeline with close propagation.

use conduit::Channel;
use std::thread;

fn main() {
  let raw = Channel::buffered(2);
  let squared = Channel::buffered(2);

  let stage = {
    let raw = raw.clone();
    let squared = squared.clone();
    thread::spawn(move || {
      while let Some(n) = raw.recv() {
        if squared.send(n * n).is_err() {
          break;
        }
      }
      // Upstream is exhausted; propagate the close downstream.
      squared.close();
    })
  };

  let sink = {
    let squared = squared.clone();
    thread::spawn(move || {
      let mut total = 0u64;
      while let Some(n) = squared.recv() {
        println!("squared -> {}", n);
        total += n;
      }
      total
    })
  };

  for n in 1..=10u64 {
    raw.send(n).unwrap();
  }
  raw.close();

  stage.join().unwrap();
  let total = sink.join().unwrap();
  println!("sum of squares 1..=10 = {}", total);
}
