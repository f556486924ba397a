mod common;
use common::*;

use conduit::{select_wait, Channel, SelectCase};

use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Shared fan-out helper: `producers` threads each send `items` distinct
// values through `ch`, a single consumer drains until exhaustion, and the
// received multiset must equal the produced one.
fn run_conservation_test(ch: Channel<usize>, producers: usize, items: usize) {
  let consumer = {
    let ch = ch.clone();
    thread::spawn(move || {
      let mut seen = HashSet::new();
      while let Some(value) = ch.recv() {
        assert!(seen.insert(value), "duplicate value {}", value);
      }
      seen
    })
  };

  let mut handles = Vec::new();
  for p in 0..producers {
    let ch = ch.clone();
    handles.push(thread::spawn(move || {
      for i in 0..items {
        ch.send(p * items + i).unwrap();
      }
    }));
  }
  for handle in handles {
    handle.join().expect("producer panicked");
  }
  ch.close();

  let seen = consumer.join().expect("consumer panicked");
  assert_eq!(seen.len(), producers * items, "values lost in transit");
}

#[test]
fn three_producers_into_buffered_channel() {
  run_conservation_test(Channel::buffered(10), 3, 100);
}

#[test]
fn producers_into_rendezvous_channel() {
  run_conservation_test(Channel::new(), 3, ITEMS_LOW);
}

#[test]
fn high_contention_small_buffer() {
  run_conservation_test(Channel::buffered(2), 8, ITEMS_MEDIUM);
}

#[test]
fn multi_consumer_conservation() {
  let ch = Channel::buffered(4);
  let producers = 4;
  let consumers = 4;
  let items = ITEMS_MEDIUM;

  let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));
  let received_count = Arc::new(AtomicUsize::new(0));

  let mut consumer_handles = Vec::new();
  for _ in 0..consumers {
    let ch = ch.clone();
    let seen = Arc::clone(&seen);
    let received_count = Arc::clone(&received_count);
    consumer_handles.push(thread::spawn(move || {
      while let Some(value) = ch.recv() {
        assert!(seen.lock().unwrap().insert(value), "duplicate value {}", value);
        received_count.fetch_add(1, AtomicOrdering::Relaxed);
      }
    }));
  }

  let mut producer_handles = Vec::new();
  for p in 0..producers {
    let ch = ch.clone();
    producer_handles.push(thread::spawn(move || {
      for i in 0..items {
        ch.send(p * items + i).unwrap();
      }
    }));
  }

  for handle in producer_handles {
    handle.join().expect("producer panicked");
  }
  ch.close();
  for handle in consumer_handles {
    handle.join().expect("consumer panicked");
  }

  assert_eq!(received_count.load(AtomicOrdering::Relaxed), producers * items);
}

#[test]
fn jittered_producers_and_timed_consumer() {
  let ch = Channel::buffered(8);
  let producers = 4;
  let items = ITEMS_LOW;

  let mut handles = Vec::new();
  for p in 0..producers {
    let ch = ch.clone();
    handles.push(thread::spawn(move || {
      let mut rng = rand::thread_rng();
      for i in 0..items {
        if rng.gen_bool(0.2) {
          thread::sleep(Duration::from_micros(rng.gen_range(1..200)));
        }
        ch.send(p * items + i).unwrap();
      }
    }));
  }

  let mut seen = HashSet::new();
  let deadline = Instant::now() + STRESS_TIMEOUT;
  while seen.len() < producers * items {
    assert!(Instant::now() < deadline, "consumer starved");
    if let Ok(value) = ch.recv_timeout(SHORT_TIMEOUT) {
      assert!(seen.insert(value), "duplicate value {}", value);
    }
  }

  for handle in handles {
    handle.join().expect("producer panicked");
  }
  ch.close();
  assert_eq!(ch.recv(), None);
}

#[test]
fn close_under_load_wakes_everyone() {
  let ch = Channel::<usize>::buffered(1);
  let mut handles = Vec::new();

  // Saturate the channel with more senders than capacity so most of them
  // park, then close underneath them.
  for i in 0..8 {
    let ch = ch.clone();
    handles.push(thread::spawn(move || {
      let _ = ch.send(i);
    }));
  }
  for _ in 0..4 {
    let ch = ch.clone();
    handles.push(thread::spawn(move || {
      let _ = ch.recv();
    }));
  }

  thread::sleep(SHORT_TIMEOUT / 10);
  ch.close();

  let deadline = Instant::now() + STRESS_TIMEOUT;
  for handle in handles {
    assert!(Instant::now() < deadline, "a blocked thread never woke");
    handle.join().expect("blocked thread panicked");
  }
}

#[test]
fn select_fan_in_under_load() {
  let channels: Vec<Channel<usize>> = (0..4).map(|_| Channel::buffered(2)).collect();
  let items = ITEMS_LOW;

  let mut producers = Vec::new();
  for (index, ch) in channels.iter().enumerate() {
    let ch = ch.clone();
    producers.push(thread::spawn(move || {
      let mut rng = rand::thread_rng();
      for i in 0..items {
        if rng.gen_bool(0.1) {
          thread::sleep(Duration::from_micros(rng.gen_range(1..100)));
        }
        ch.send(index * items + i).unwrap();
      }
      ch.close();
    }));
  }

  let mut seen = HashSet::new();
  let deadline = Instant::now() + STRESS_TIMEOUT;
  loop {
    assert!(Instant::now() < deadline, "select fan-in starved");
    let cases: Vec<SelectCase<'_>> = channels.iter().map(SelectCase::recv).collect();
    match select_wait(&cases, Some(SHORT_TIMEOUT)) {
      Some(index) => {
        if let Ok(value) = channels[index].try_recv() {
          assert!(seen.insert(value), "duplicate value {}", value);
        }
      }
      None => {}
    }
    let all_dead = channels.iter().all(|ch| ch.is_closed() && ch.is_empty());
    if all_dead {
      break;
    }
  }

  assert_eq!(seen.len(), channels.len() * items);
  for handle in producers {
    handle.join().expect("producer panicked");
  }
}
