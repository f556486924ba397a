use super::*;
use crate::channel::Channel;

use std::thread;
use std::time::{Duration, Instant};

const TEST_TIMEOUT: Duration = Duration::from_secs(2);
const SHORT: Duration = Duration::from_millis(50);

#[test]
fn poll_reports_first_ready_case() {
  let first = Channel::buffered(1);
  let second = Channel::buffered(1);
  first.try_send(1).unwrap();
  second.try_send(2).unwrap();

  // Both are ready; priority follows case order.
  let cases = [SelectCase::recv(&first), SelectCase::recv(&second)];
  assert_eq!(select_poll(&cases), Some(0));

  let reversed = [SelectCase::recv(&second), SelectCase::recv(&first)];
  assert_eq!(select_poll(&reversed), Some(0));
}

#[test]
fn poll_none_when_nothing_ready() {
  let a = Channel::<u32>::buffered(1);
  let b = Channel::<String>::buffered(1);
  let cases = [SelectCase::recv(&a), SelectCase::recv(&b)];
  assert_eq!(select_poll(&cases), None);
}

#[test]
fn poll_mixes_element_types() {
  let numbers = Channel::<i32>::buffered(1);
  let words: Channel<String> = Channel::buffered(1);
  words.try_send("hi".to_string()).unwrap();

  let cases = [SelectCase::recv(&numbers), SelectCase::recv(&words)];
  assert_eq!(select_poll(&cases), Some(1));
  assert_eq!(words.try_recv().unwrap(), "hi");
}

#[test]
fn poll_send_readiness_tracks_buffer_space() {
  let ch = Channel::buffered(1);
  let cases = [SelectCase::send(&ch)];
  assert_eq!(select_poll(&cases), Some(0));

  ch.try_send(1).unwrap();
  assert_eq!(select_poll(&cases), None);

  assert_eq!(ch.recv(), Some(1));
  assert_eq!(select_poll(&cases), Some(0));
}

#[test]
fn poll_send_not_ready_on_closed_channel() {
  let ch = Channel::<u8>::buffered(4);
  ch.close();
  assert_eq!(select_poll(&[SelectCase::send(&ch)]), None);
}

#[test]
fn poll_recv_ready_on_closed_channel() {
  let ch = Channel::<u8>::buffered(4);
  ch.close();
  // Closed means a recv completes immediately (with None).
  assert_eq!(select_poll(&[SelectCase::recv(&ch)]), Some(0));
}

#[test]
fn poll_send_sees_parked_rendezvous_receiver() {
  let ch = Channel::new();
  let cases = [SelectCase::send(&ch)];
  assert_eq!(select_poll(&cases), None);

  let receiver = ch.clone();
  let consumer = thread::spawn(move || receiver.recv());

  // Wait for the receiver to park, then readiness must hold.
  let deadline = Instant::now() + TEST_TIMEOUT;
  let mut ready = false;
  while Instant::now() < deadline {
    if select_poll(&cases) == Some(0) {
      ready = true;
      break;
    }
    thread::sleep(Duration::from_millis(1));
  }
  assert!(ready, "send case never became ready with a parked receiver");

  ch.try_send(21).unwrap();
  assert_eq!(consumer.join().unwrap(), Some(21));
}

#[test]
fn wait_returns_ready_case_without_parking() {
  let ch = Channel::buffered(1);
  ch.try_send(1).unwrap();
  let cases = [SelectCase::recv(&ch)];
  assert_eq!(select_wait(&cases, None), Some(0));
  // The waiter never registered, so nothing is left behind.
  assert_eq!(ch.select_waiter_count(), 0);
}

#[test]
fn wait_times_out_on_idle_channel() {
  let ch = Channel::<u32>::buffered(1);
  let cases = [SelectCase::recv(&ch)];

  let started = Instant::now();
  assert_eq!(select_wait(&cases, Some(Duration::from_millis(10))), None);
  assert!(started.elapsed() >= Duration::from_millis(10));
  // Deregistered on the timeout path.
  assert_eq!(ch.select_waiter_count(), 0);
}

#[test]
fn wait_wakes_on_send() {
  let ch = Channel::buffered(1);
  let sender = ch.clone();
  let producer = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    sender.send(5)
  });

  let cases = [SelectCase::recv(&ch)];
  assert_eq!(select_wait(&cases, Some(TEST_TIMEOUT)), Some(0));
  assert_eq!(ch.try_recv(), Ok(5));
  producer.join().unwrap().unwrap();
  assert_eq!(ch.select_waiter_count(), 0);
}

#[test]
fn wait_wakes_on_close() {
  let ch = Channel::<u32>::new();
  let closer = ch.clone();
  let trigger = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    closer.close();
  });

  // No timeout: only the close can end this wait.
  let cases = [SelectCase::recv(&ch)];
  assert_eq!(select_wait(&cases, None), Some(0));
  assert_eq!(ch.recv(), None);
  trigger.join().unwrap();
  assert_eq!(ch.select_waiter_count(), 0);
}

#[test]
fn wait_wakes_on_space_for_send_case() {
  let ch = Channel::buffered(1);
  ch.try_send(1).unwrap();

  let receiver = ch.clone();
  let consumer = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    receiver.recv()
  });

  let cases = [SelectCase::send(&ch)];
  assert_eq!(select_wait(&cases, Some(TEST_TIMEOUT)), Some(0));
  ch.try_send(2).unwrap();
  assert_eq!(consumer.join().unwrap(), Some(1));
  assert_eq!(ch.recv(), Some(2));
}

#[test]
fn wait_none_when_all_send_cases_dead() {
  let a = Channel::<u8>::buffered(1);
  let b = Channel::<u8>::buffered(1);
  a.close();
  b.close();

  let cases = [SelectCase::send(&a), SelectCase::send(&b)];
  assert_eq!(select_wait(&cases, None), None);
}

#[test]
fn wait_empty_case_list_returns_none() {
  assert_eq!(select_wait(&[], Some(SHORT)), None);
  assert_eq!(select_wait(&[], None), None);
}

#[test]
fn wait_handles_duplicate_channels() {
  let ch = Channel::buffered(1);
  // The same channel appears as both a send and a recv case; the lock order
  // must deduplicate it rather than deadlock.
  let cases = [SelectCase::recv(&ch), SelectCase::send(&ch)];
  assert_eq!(select_wait(&cases, Some(TEST_TIMEOUT)), Some(1));

  ch.try_send(3).unwrap();
  assert_eq!(select_wait(&cases, Some(TEST_TIMEOUT)), Some(0));
  assert_eq!(ch.select_waiter_count(), 0);
}

#[test]
fn wait_across_many_channels_wakes_on_the_ready_one() {
  let channels: Vec<Channel<usize>> = (0..8).map(|_| Channel::buffered(1)).collect();
  let target = channels[5].clone();
  let producer = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    target.send(55)
  });

  let cases: Vec<SelectCase<'_>> = channels.iter().map(SelectCase::recv).collect();
  assert_eq!(select_wait(&cases, Some(TEST_TIMEOUT)), Some(5));
  assert_eq!(channels[5].try_recv(), Ok(55));
  producer.join().unwrap().unwrap();

  for ch in &channels {
    assert_eq!(ch.select_waiter_count(), 0);
  }
}

#[test]
fn concurrent_selects_on_shared_channels_do_not_deadlock() {
  let a = Channel::<usize>::buffered(1);
  let b = Channel::<usize>::buffered(1);

  let mut arbiters = Vec::new();
  for _ in 0..4 {
    let a = a.clone();
    let b = b.clone();
    arbiters.push(thread::spawn(move || {
      let mut observed = 0;
      loop {
        let cases = [SelectCase::recv(&a), SelectCase::recv(&b)];
        match select_wait(&cases, Some(TEST_TIMEOUT)) {
          Some(0) => {
            if a.try_recv().is_ok() {
              observed += 1;
            }
          }
          Some(1) => {
            if b.try_recv().is_ok() {
              observed += 1;
            }
          }
          Some(_) => unreachable!(),
          None => break,
        }
        if a.is_closed() && b.is_closed() && a.is_empty() && b.is_empty() {
          break;
        }
      }
      observed
    }));
  }

  for i in 0..100 {
    if i % 2 == 0 {
      a.send(i).unwrap();
    } else {
      b.send(i).unwrap();
    }
  }
  a.close();
  b.close();

  let total: usize = arbiters.into_iter().map(|h| h.join().unwrap()).sum();
  assert_eq!(total, 100);
}

#[test]
fn case_debug_names_the_kind() {
  let ch = Channel::<u8>::buffered(1);
  let case = SelectCase::recv(&ch);
  let rendered = format!("{:?}", case);
  assert!(rendered.contains("Recv"));
}
