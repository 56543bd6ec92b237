// GPIO |     Function      |      Notes
// -----+-------------------+-------------------------------------
//  1   | ADC1 - Supply     | 220K/47K divider off the switched rail
//  2   | Vehicle sense     | High while the bike supplies power
//  3   | IMU INT1          | Motion wake, active high
//  4   | Expander INT      | Any button change, active low
//  8   | I2C0 SDA          | LSM303 + TCA9554
//  9   | I2C0 SCL          | 400 kHz
// 10   | SPI2 CS           | SD card
// 11   | SPI2 MOSI         |
// 12   | SPI2 SCK          |
// 13   | SPI2 MISO         |
// 14   | Backlight PWM     | LEDC channel 0
// 17   | UART1 TX          | To GNSS RX
// 18   | UART1 RX          | From GNSS TX
// 21   | TFT RST           |
// 38   | TFT DC            | Low = command
// 39   | TFT WR            | Latches on rising edge
// 40-47| TFT D0..D7        | 8080 data bus

// ----- Supply -----
pub const SUPPLY_ADC: u8 = 1;
pub const VEHICLE_SENSE: u8 = 2;

// ----- Wake sources -----
pub const IMU_INT1: u8 = 3;
pub const EXPANDER_INT: u8 = 4;

// ----- I2C0 -----
pub const I2C_SDA: u8 = 8;
pub const I2C_SCL: u8 = 9;
pub const I2C_FREQ_KHZ: u32 = 400;

// ----- SD card (SPI2) -----
pub const SD_CS: u8 = 10;
pub const SD_MOSI: u8 = 11;
pub const SD_SCK: u8 = 12;
pub const SD_MISO: u8 = 13;
pub const SD_FREQ_KHZ: u32 = 20_000;

// ----- Panel -----
pub const BACKLIGHT: u8 = 14;
pub const BACKLIGHT_PWM_KHZ: u32 = 20;
pub const TFT_RST: u8 = 21;
pub const TFT_DC: u8 = 38;
pub const TFT_WR: u8 = 39;
pub const TFT_D0: u8 = 40;

// ----- GNSS (UART1) -----
pub const GPS_TX: u8 = 17;
pub const GPS_RX: u8 = 18;
