//! End-to-end engine scenarios: CSV replay into portfolio state, strategy
//! order flow, determinism, and result metrics.

use backtest::{
    CsvDataSource, DataSource, MarketMakerStrategy, Params, SimulationEngine, Strategy,
    SyntheticConfig, SyntheticDataSource,
};
use matching_engine::OrderBook;
use rust_decimal::Decimal;
use std::io::Cursor;
use types::ids::OrderId;
use types::market_data::MarketDataUpdate;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side};

fn csv_source(feed: &str) -> Box<CsvDataSource> {
    Box::new(CsvDataSource::from_reader(Cursor::new(feed.to_string())).unwrap())
}

fn engine_with(feed: &str) -> SimulationEngine {
    let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
    engine.set_commission_rate(Decimal::ZERO);
    engine.set_data_source(csv_source(feed));
    engine
}

#[test]
fn test_feed_round_trip_to_portfolio() {
    // A resting bid is lifted by a crossing ask from the feed: the engine
    // books the fill as an aggressive sale of 40 at the bid's price.
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,BID,100,50,1
2000,ACME,ADD,ASK,99,40,2
3000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    let result = engine.run().unwrap();

    assert_eq!(engine.portfolio().net_position("ACME"), -40);
    let position = engine.portfolio().position("ACME").unwrap();
    assert_eq!(position.average_price, Decimal::new(100, 2));

    // The residual bid of 10 still rests.
    let book = engine.book("ACME").unwrap();
    assert_eq!(book.best_bid(), Price::from_ticks(100));
    assert_eq!(book.best_bid_quantity(), Quantity::new(10));

    assert_eq!(engine.history().len(), 1);
    assert_eq!(result.num_trades, 1);
}

#[test]
fn test_modify_cancel_replay() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,BID,100,50,1
2000,ACME,ADD,BID,100,30,2
3000,ACME,MODIFY,BID,0,20,1
4000,ACME,CANCEL,BID,0,0,2
5000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    engine.run().unwrap();

    let book = engine.book("ACME").unwrap();
    assert_eq!(book.order_count(), 1);
    // The shrink kept id=1 at the front with its reduced size.
    let order = book.get_order(OrderId::new(1)).unwrap();
    assert_eq!(order.remaining, Quantity::new(20));
    assert_eq!(book.best_bid_quantity(), Quantity::new(20));
}

#[test]
fn test_trade_rows_flow_into_portfolio() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,TRADE,BID,100,10,0
2000,ACME,TRADE,ASK,100,4,0
3000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    let result = engine.run().unwrap();

    assert_eq!(engine.portfolio().net_position("ACME"), 6);
    assert_eq!(result.num_trades, 2);
    assert_eq!(engine.stats().orders_filled, 2);
}

#[test]
fn test_equity_matches_initial_capital_without_fills() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,BID,100,50,1
2000,ACME,ADD,ASK,110,50,2
3000,ACME,EOD,,,,
4000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    engine.run().unwrap();

    for snapshot in engine.history() {
        assert_eq!(snapshot.equity, Decimal::from(1_000_000));
        assert_eq!(snapshot.cash, Decimal::from(1_000_000));
    }
}

/// Buys once with a market order as soon as enough ask depth is visible.
struct OneShotBuyer {
    size: u64,
    min_ask_levels: usize,
    bought: bool,
}

impl OneShotBuyer {
    fn new(size: u64, min_ask_levels: usize) -> Self {
        Self {
            size,
            min_ask_levels,
            bought: false,
        }
    }
}

impl Strategy for OneShotBuyer {
    fn name(&self) -> &str {
        "one_shot_buyer"
    }

    fn on_market_data(
        &mut self,
        _update: &MarketDataUpdate,
        _book: &OrderBook,
        _portfolio: &backtest::Portfolio,
    ) {
    }

    fn generate_orders(
        &mut self,
        book: &OrderBook,
        _portfolio: &backtest::Portfolio,
    ) -> Vec<Order> {
        if self.bought || book.ask_levels(self.min_ask_levels).len() < self.min_ask_levels {
            return Vec::new();
        }
        self.bought = true;
        vec![Order::new(
            OrderId::NULL,
            Side::Bid,
            OrderType::Market,
            Price::ZERO,
            Quantity::new(self.size),
            0,
        )]
    }
}

#[test]
fn test_strategy_market_order_fills_inline() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,ASK,105,30,1
2000,ACME,ADD,ASK,106,40,2
3000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    engine.add_strategy(Box::new(OneShotBuyer::new(50, 2)));
    engine.run().unwrap();

    // The sweep crossed both levels: 30 @ 105, 20 @ 106.
    assert_eq!(engine.portfolio().net_position("ACME"), 50);
    let records = engine.trade_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].price, 1.05);
    assert_eq!(records[1].price, 1.06);

    let book = engine.book("ACME").unwrap();
    assert_eq!(book.best_ask(), Price::from_ticks(106));
    assert_eq!(book.best_ask_quantity(), Quantity::new(20));
}

#[test]
fn test_strategy_sees_fill_callbacks() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,ASK,105,30,1
2000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    engine.add_strategy(Box::new(OneShotBuyer::new(10, 1)));
    engine.run().unwrap();

    // Downcast is unavailable; assert through engine counters instead.
    assert_eq!(engine.stats().orders_sent, 1);
    assert_eq!(engine.stats().orders_filled, 1);
}

#[test]
fn test_market_maker_rests_quotes() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,BID,9900,50,1
2000,ACME,ADD,ASK,10100,50,2
3000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    let mut maker = MarketMakerStrategy::new();
    maker.set_parameters(Params::new().set("spread_bps", 20.0).set("order_size", 5.0));
    engine.add_strategy(Box::new(maker));
    engine.run().unwrap();

    // Quotes landed inside the feed's spread without crossing it.
    let book = engine.book("ACME").unwrap();
    assert!(book.best_bid() > Price::from_ticks(9900));
    assert!(book.best_ask() < Price::from_ticks(10100));
    assert!(!book.is_crossed());
    assert_eq!(engine.portfolio().net_position("ACME"), 0);
}

#[test]
fn test_synthetic_replay_is_deterministic() {
    let run = || {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.set_commission_rate(Decimal::ZERO);
        engine.set_data_source(Box::new(SyntheticDataSource::new(SyntheticConfig {
            events: 500,
            ..Default::default()
        })));
        engine.run().unwrap();
        let book = engine.book("SYN").unwrap();
        (
            book.order_count(),
            book.best_bid(),
            book.best_ask(),
            book.trades().len(),
            engine.portfolio().cash(),
            engine.stats().events_processed,
        )
    };

    assert_eq!(run(), run());
}

#[test]
fn test_source_reset_reproduces_run() {
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000,ACME,ADD,BID,100,50,1
2000,ACME,ADD,ASK,99,40,2
3000,ACME,EOD,,,,
";
    let mut source = CsvDataSource::from_reader(Cursor::new(feed.to_string())).unwrap();
    let mut first = Vec::new();
    while let Some(event) = source.next_event() {
        first.push(event);
    }
    source.reset();
    let mut second = Vec::new();
    while let Some(event) = source.next_event() {
        second.push(event);
    }
    assert_eq!(first, second);
}

#[test]
fn test_result_metrics_from_equity_series() {
    // Two EODs around a losing fill produce a drawdown and a trade count.
    let feed = "\
timestamp_ns,symbol,type,side,price,quantity,order_id
1000000000,ACME,ADD,BID,100,50,1
2000000000,ACME,ADD,ASK,110,50,2
3000000000,ACME,EOD,,,,
4000000000,ACME,TRADE,BID,110,10,0
5000000000,ACME,EOD,,,,
";
    let mut engine = engine_with(feed);
    let result = engine.run().unwrap();

    assert_eq!(result.num_trades, 1);
    assert_eq!(result.equity_curve.len(), 2);
    // Bought 10 above the mid: equity decays against the 105 mark.
    assert!(result.total_return < 0.0);
    assert!(result.max_drawdown > 0.0);
}
