use std::time::Duration;

use thenable::{
    future::{Future, Handler},
    task::EventLoop,
    timer::set_timeout,
};

fn main() {
    let early = Future::<&str, &str>::new(|resolve, _| resolve("settled early"));
    early.then(Handler::new(|v| println!("A: {v}")), Handler::none());

    let late = Future::<&str, &str>::new(|resolve, _| {
        set_timeout(Duration::from_millis(500), move || resolve("settled late"));
    });
    late.then(Handler::new(|v| println!("B: {v}")), Handler::none());
    late.then(Handler::new(|v| println!("C: {v}")), Handler::none());

    let failed = Future::<(), &str>::new(|_, reject| reject("it broke"));
    failed.then(Handler::none(), Handler::new(|e| println!("D: {e}")));

    println!("Registered, state: {} {} {}", early.state(), late.state(), failed.state());

    EventLoop::run();

    println!("Done, state: {} {} {}", early.state(), late.state(), failed.state());
}
