use tickwire::TickwireError;
use tickwire::config::fetch_config;
use tickwire::models::candle::{Candle, CandleQuery};
use tickwire::models::trade::Trade;
use tickwire::websocket::StreamSession;
use tokio::sync::mpsc;
use tracing::info;

/// Events forwarded from the receive task to the main loop.
enum Event {
    Trade(Trade),
    Candle(Candle),
}

#[tokio::main]
async fn main() -> Result<(), TickwireError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let session = StreamSession::from_config(&app_config.stream);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let buy_tx = tx.clone();
    session.on_buy_trade(move |trade| {
        let _ = buy_tx.send(Event::Trade(trade.clone()));
    });
    let sell_tx = tx.clone();
    session.on_sell_trade(move |trade| {
        let _ = sell_tx.send(Event::Trade(trade.clone()));
    });
    session.on_candle(move |candle| {
        let _ = tx.send(Event::Candle(candle.clone()));
    });

    session.connect().await?;
    for symbol in &app_config.symbols {
        session.subscribe_trades(symbol).await?;
        let mut query = CandleQuery::new(symbol.clone());
        query.period_secs = app_config.candle_period_secs;
        session.subscribe_candles(&query).await?;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Event::Trade(trade)) => info!(
                    symbol = trade.symbol,
                    side = trade.side.as_str(),
                    price = %trade.price,
                    amount = %trade.amount,
                    trade_id = trade.id,
                    timestamp = %trade.timestamp,
                    "Trade"
                ),
                Some(Event::Candle(candle)) => info!(
                    symbol = candle.symbol,
                    open = %candle.open,
                    high = %candle.high,
                    low = %candle.low,
                    close = %candle.close,
                    volume = %candle.volume,
                    open_time = %candle.open_time,
                    "Candle"
                ),
                None => break,
            },
            () = session.closed() => {
                info!("Stream closed by server");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    for symbol in &app_config.symbols {
        session.unsubscribe_trades(symbol).await.ok();
        session.unsubscribe_candles(symbol).await.ok();
    }
    session.close().await;

    Ok(())
}
