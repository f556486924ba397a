// demos/fan_in.rs
//
// Merge two producer streams into one consumer with select.

use conduit::{select_wait, Channel, SelectCase};
use std::thread;
use std::time::Duration;

fn main() {
  let fast = Channel::buffered(4);
  let slow = Channel::buffered(4);

  let fast_producer = {
    let fast = fast.clone();
    thread::spawn(move || {
      for i in 0..10u32 {
        fast.send(i).unwrap();
        thread::sleep(Duration::from_millis(5));
      }
      fast.close();
    })
  };
  let slow_producer = {
    let slow = slow.clone();
    thread::spawn(move || {
      for i in 100..105u32 {
        slow.send(i).unwrap();
        thread::sleep(Duration::from_millis(20));
      }
      slow.close();
    })
  };

  loop {
    let cases = [SelectCase::recv(&fast), SelectCase::recv(&slow)];
    match select_wait(&cases, None) {
      Some(0) => {
        if let Ok(value) = fast.try_recv() {
          println!("fast -> {}", value);
        }
      }
      Some(1) => {
        if let Ok(value) = slow.try_recv() {
          println!("slow -> {}", value);
        }
      }
      _ => {}
    }
    if fast.is_closed() && slow.is_closed() && fast.is_empty() && slow.is_empty() {
      break;
    }
  }

  fast_producer.join().unwrap();
  slow_producer.join().unwrap();
  println!("both streams drained");
}
